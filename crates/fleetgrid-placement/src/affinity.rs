//! Affinity rule engine.
//!
//! A rule constrains which workloads may share a host with the workload
//! being placed:
//!
//! ```text
//! rule := ["NOT" | "SAME"] verb [parameter]
//! verb := TYPE | NAME | ID | APPLICATION | PREDICATE | EMPTY
//! ```
//!
//! Keywords are case-insensitive. Without a parameter, `TYPE`, `ID` and
//! `APPLICATION` compare a candidate against the placing workload itself.
//! `EMPTY` compiles to no predicate; it decides whether hosts with nothing
//! deployed are admissible. All rules in a set are ANDed together.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use fleetgrid_state::WorkloadSpec;

use crate::error::{AffinityError, AffinityResult};

/// A compiled test over a co-located workload.
pub type WorkloadPredicate = Arc<dyn Fn(&WorkloadSpec) -> bool + Send + Sync>;

/// Zero-argument constructor for a named predicate.
pub type PredicateFactory = Arc<dyn Fn() -> WorkloadPredicate + Send + Sync>;

// ── Predicate registry ─────────────────────────────────────────────

/// Named predicates available to `PREDICATE <name>` rules.
#[derive(Clone)]
pub struct PredicateRegistry {
    factories: HashMap<String, PredicateFactory>,
}

impl PredicateRegistry {
    /// A registry with no predicates at all.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry holding the built-in predicates:
    ///
    /// - `always`, `never`
    /// - `has-parent`: the candidate is a child of another workload
    /// - `unattached`: the candidate is attached to no virtual network
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("always", || Arc::new(|_: &WorkloadSpec| true));
        registry.register("never", || Arc::new(|_: &WorkloadSpec| false));
        registry.register("has-parent", || {
            Arc::new(|w: &WorkloadSpec| w.parent_id.is_some())
        });
        registry.register("unattached", || {
            Arc::new(|w: &WorkloadSpec| w.attached_networks.is_empty())
        });
        registry
    }

    /// Register (or replace) a named predicate constructor.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> WorkloadPredicate + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Construct a fresh instance of the named predicate.
    pub fn instantiate(&self, name: &str) -> AffinityResult<WorkloadPredicate> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| AffinityError::Configuration(format!("unknown predicate {name:?}")))
    }
}

impl Default for PredicateRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for PredicateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateRegistry")
            .field("names", &self.names())
            .finish()
    }
}

fn builtin_registry() -> Arc<PredicateRegistry> {
    static BUILTINS: OnceLock<Arc<PredicateRegistry>> = OnceLock::new();
    BUILTINS
        .get_or_init(|| Arc::new(PredicateRegistry::with_builtins()))
        .clone()
}

// ── Rules ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Type,
    Name,
    Id,
    Application,
    Predicate,
    Empty,
}

impl Verb {
    fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "TYPE" => Some(Self::Type),
            "NAME" => Some(Self::Name),
            "ID" => Some(Self::Id),
            "APPLICATION" => Some(Self::Application),
            "PREDICATE" => Some(Self::Predicate),
            "EMPTY" => Some(Self::Empty),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Type => "TYPE",
            Self::Name => "NAME",
            Self::Id => "ID",
            Self::Application => "APPLICATION",
            Self::Predicate => "PREDICATE",
            Self::Empty => "EMPTY",
        }
    }
}

/// One parsed rule. Only [`Rule::parse`] builds one, so `NAME` and
/// `PREDICATE` rules always carry a parameter and `EMPTY` never does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    negate: bool,
    verb: Verb,
    parameter: Option<String>,
}

impl Rule {
    pub fn negate(&self) -> bool {
        self.negate
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn parameter(&self) -> Option<&str> {
        self.parameter.as_deref()
    }

    /// Parse a single rule. Structural errors are reported here; unknown
    /// predicate names are only detected when the rule is compiled.
    pub fn parse(rule: &str) -> AffinityResult<Self> {
        let mut tokens = rule.split_whitespace().peekable();

        let mut negate = false;
        if let Some(first) = tokens.peek() {
            if first.eq_ignore_ascii_case("NOT") {
                negate = true;
                tokens.next();
            } else if first.eq_ignore_ascii_case("SAME") {
                tokens.next();
            }
        }

        let verb_token = tokens
            .next()
            .ok_or_else(|| AffinityError::parse(rule, "verb not specified"))?;
        let verb = Verb::from_token(verb_token)
            .ok_or_else(|| AffinityError::parse(rule, format!("unexpected verb {verb_token:?}")))?;

        let parameter = tokens.next().map(str::to_string);
        if let Some(extra) = tokens.next() {
            return Err(AffinityError::parse(
                rule,
                format!("unexpected extra token {extra:?}"),
            ));
        }

        match (verb, &parameter) {
            (Verb::Empty, Some(p)) => Err(AffinityError::parse(
                rule,
                format!("EMPTY takes no parameter, found {p:?}"),
            )),
            (Verb::Name | Verb::Predicate, None) => Err(AffinityError::parse(
                rule,
                format!("{} requires a parameter", verb.as_str()),
            )),
            _ => Ok(Self {
                negate,
                verb,
                parameter,
            }),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negate {
            f.write_str("NOT ")?;
        }
        f.write_str(self.verb.as_str())?;
        if let Some(p) = &self.parameter {
            write!(f, " {p}")?;
        }
        Ok(())
    }
}

// ── Rule sets ──────────────────────────────────────────────────────

/// The compiled rule set for one workload being placed.
///
/// Built with [`AffinityRules::for_workload`] and then fed rule sources
/// with [`parse`](Self::parse) or [`parse_str`](Self::parse_str). Each
/// call adds to the conjunction; a failing call leaves no partial state
/// behind because the builder is consumed.
#[derive(Clone)]
pub struct AffinityRules {
    placing: WorkloadSpec,
    registry: Arc<PredicateRegistry>,
    rules: Vec<Rule>,
    predicates: Vec<WorkloadPredicate>,
    allow_empty: bool,
}

impl AffinityRules {
    /// An empty rule set: admits every workload and allows empty hosts.
    pub fn for_workload(placing: &WorkloadSpec) -> Self {
        Self {
            placing: placing.clone(),
            registry: builtin_registry(),
            rules: Vec::new(),
            predicates: Vec::new(),
            allow_empty: true,
        }
    }

    /// Resolve `PREDICATE` rules against `registry` instead of the built-ins.
    pub fn with_registry(mut self, registry: Arc<PredicateRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Add individual rules, one per item.
    pub fn parse<I, S>(mut self, rules: I) -> AffinityResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for rule in rules {
            let rule = Rule::parse(rule.as_ref())?;
            self.compile(rule)?;
        }
        Ok(self)
    }

    /// Add rules from a string holding several rules separated by
    /// newlines or commas.
    pub fn parse_str(self, rules: &str) -> AffinityResult<Self> {
        self.parse(split_rules(rules))
    }

    fn compile(&mut self, rule: Rule) -> AffinityResult<()> {
        let predicate: WorkloadPredicate = match (rule.verb, rule.parameter.clone()) {
            (Verb::Empty, _) => {
                self.allow_empty = !rule.negate;
                self.rules.push(rule);
                return Ok(());
            }
            (Verb::Type, None) => {
                let full = self.placing.type_name.clone();
                let simple = self.placing.simple_type_name().to_string();
                Arc::new(move |w: &WorkloadSpec| {
                    w.type_name.eq_ignore_ascii_case(&full)
                        || w.simple_type_name().eq_ignore_ascii_case(&simple)
                })
            }
            (Verb::Type, Some(p)) => Arc::new(move |w: &WorkloadSpec| {
                w.type_name.eq_ignore_ascii_case(&p) || w.simple_type_name().eq_ignore_ascii_case(&p)
            }),
            (Verb::Name, p) => {
                let needle = p.unwrap_or_default().to_lowercase();
                Arc::new(move |w: &WorkloadSpec| w.name.to_lowercase().contains(&needle))
            }
            (Verb::Id, p) => {
                let id = p.unwrap_or_else(|| self.placing.id.clone());
                Arc::new(move |w: &WorkloadSpec| w.id == id)
            }
            (Verb::Application, p) => {
                let app = p.unwrap_or_else(|| self.placing.application_id.clone());
                Arc::new(move |w: &WorkloadSpec| w.application_id == app)
            }
            (Verb::Predicate, p) => self.registry.instantiate(&p.unwrap_or_default())?,
        };

        let predicate = if rule.negate {
            Arc::new(move |w: &WorkloadSpec| !predicate(w)) as WorkloadPredicate
        } else {
            predicate
        };
        self.predicates.push(predicate);
        self.rules.push(rule);
        Ok(())
    }

    /// True if `candidate` satisfies every rule.
    pub fn test(&self, candidate: &WorkloadSpec) -> bool {
        self.predicates.iter().all(|p| p(candidate))
    }

    /// Whether a host with no deployed workloads is admissible.
    pub fn allows_empty_hosts(&self) -> bool {
        self.allow_empty
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl fmt::Debug for AffinityRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AffinityRules")
            .field("placing", &self.placing.id)
            .field("rules", &self.rules)
            .field("allow_empty", &self.allow_empty)
            .finish()
    }
}

/// Split a multi-rule string on newlines and commas, dropping blanks.
pub fn split_rules(rules: &str) -> impl Iterator<Item = &str> {
    rules
        .split(['\n', ','])
        .map(str::trim)
        .filter(|r| !r.is_empty())
}
