use std::{convert::Infallible, fmt::Debug, rc::Rc};

/// A value produced during evaluation. Values never live in the AST; they
/// exist only between `exec` starting a statement and the stringified
/// parameters leaving it.
///
/// `Unknown` is the lookup-miss sentinel. It is never a legal final result:
/// the evaluator converts it into an "undefined parameter/property" error at
/// the lookup site.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<D> {
    Unknown,
    Str(Rc<str>),
    Bool(bool),
    Int(i64),
    Float(f64),
    Dict(D),
}

impl<D> Value<D> {
    pub fn str(value: impl AsRef<str>) -> Self {
        Self::Str(Rc::from(value.as_ref()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Str(_) => "string",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Dict(_) => "object",
        }
    }
}

impl<D> From<bool> for Value<D> {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}
impl<D> From<i64> for Value<D> {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}
impl<D> From<f64> for Value<D> {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}
impl<D> From<&str> for Value<D> {
    fn from(value: &str) -> Self {
        Self::str(value)
    }
}
impl<D> From<String> for Value<D> {
    fn from(value: String) -> Self {
        Self::Str(Rc::from(value))
    }
}

/// External key/value state injected into the interpreter.
///
/// `lookup` is called with `parent = None` for a bare parameter name and with
/// the owning dictionary handle for `.name`/`[expr]` chains. A miss must be
/// reported by returning [`Value::Unknown`], not by an error; the evaluator
/// owns the error text.
///
/// `serialize` is consulted only when a dictionary value has to be turned
/// into a string; returning `None` makes the evaluator print a `"<obj>"`
/// placeholder.
pub trait Lookup {
    /// Opaque dictionary handle. Equality is identity as far as the
    /// expression language is concerned.
    type Dict: Clone + PartialEq + Debug;

    fn lookup(
        &mut self,
        key: &Value<Self::Dict>,
        parent: Option<&Self::Dict>,
    ) -> Value<Self::Dict>;

    fn serialize(&mut self, _dict: &Self::Dict) -> Option<String> {
        None
    }
}

/// Flat string-to-string parameter table. The simplest useful [`Lookup`]:
/// no dictionaries, every value comes back as a string.
#[derive(Debug, Default)]
pub struct ParamTable {
    values: std::collections::HashMap<String, Rc<str>>,
}

impl ParamTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl AsRef<str>) {
        self.values.insert(name.into(), Rc::from(value.as_ref()));
    }
}

impl Lookup for ParamTable {
    type Dict = Infallible;

    fn lookup(
        &mut self,
        key: &Value<Self::Dict>,
        parent: Option<&Self::Dict>,
    ) -> Value<Self::Dict> {
        if parent.is_some() {
            return Value::Unknown;
        }
        match key {
            Value::Str(name) => self
                .values
                .get(name.as_ref())
                .map(|value| Value::Str(value.clone()))
                .unwrap_or(Value::Unknown),
            _ => Value::Unknown,
        }
    }
}
