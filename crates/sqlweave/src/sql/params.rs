use crate::error::{OrmError, OrmResult};
use crate::value::Value;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Placeholder dialect expected by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamStyle {
    /// `?`
    #[default]
    Qmark,
    /// `:0`, `:1`, ... (0-based)
    Numeric,
    /// `%s`
    Format,
    /// `:name`
    Named,
    /// `%(name)s`
    Pyformat,
}

impl ParamStyle {
    /// Whether parameters are collected into a name→value mapping.
    pub fn is_named(self) -> bool {
        matches!(self, ParamStyle::Named | ParamStyle::Pyformat)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ParamStyle::Qmark => "qmark",
            ParamStyle::Numeric => "numeric",
            ParamStyle::Format => "format",
            ParamStyle::Named => "named",
            ParamStyle::Pyformat => "pyformat",
        }
    }

    /// Format the placeholder for a parameter at `index` named `name`.
    pub fn placeholder(self, index: usize, name: &str) -> String {
        match self {
            ParamStyle::Qmark => "?".to_string(),
            ParamStyle::Format => "%s".to_string(),
            ParamStyle::Numeric => format!(":{index}"),
            ParamStyle::Named => format!(":{name}"),
            ParamStyle::Pyformat => format!("%({name})s"),
        }
    }
}

impl fmt::Display for ParamStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamStyle {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "qmark" => Ok(ParamStyle::Qmark),
            "numeric" => Ok(ParamStyle::Numeric),
            "format" => Ok(ParamStyle::Format),
            "named" => Ok(ParamStyle::Named),
            "pyformat" => Ok(ParamStyle::Pyformat),
            other => Err(OrmError::Config(format!("unknown paramstyle '{other}'"))),
        }
    }
}

/// Statement parameters in either container shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    Positional(Vec<Value>),
    Named(Vec<(String, Value)>),
}

impl Default for Params {
    fn default() -> Self {
        Params::Positional(Vec::new())
    }
}

impl Params {
    pub fn len(&self) -> usize {
        match self {
            Params::Positional(v) => v.len(),
            Params::Named(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_named(&self) -> bool {
        matches!(self, Params::Named(_))
    }

    /// Values in container order.
    pub fn values(&self) -> Vec<&Value> {
        match self {
            Params::Positional(v) => v.iter().collect(),
            Params::Named(v) => v.iter().map(|(_, v)| v).collect(),
        }
    }

    /// Look up a named parameter.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Params::Positional(_) => None,
            Params::Named(v) => v.iter().find(|(k, _)| k == name).map(|(_, v)| v),
        }
    }
}

impl From<Vec<Value>> for Params {
    fn from(v: Vec<Value>) -> Self {
        Params::Positional(v)
    }
}

impl From<Vec<(String, Value)>> for Params {
    fn from(v: Vec<(String, Value)>) -> Self {
        Params::Named(v)
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_value(f: &mut fmt::Formatter<'_>, v: &Value) -> fmt::Result {
            match v {
                Value::Text(s) => write!(f, "'{s}'"),
                other => write!(f, "{other}"),
            }
        }
        match self {
            Params::Positional(values) => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_value(f, v)?;
                }
                f.write_str("]")
            }
            Params::Named(values) => {
                f.write_str("{")?;
                for (i, (k, v)) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: ")?;
                    write_value(f, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Build [`Params`] inline.
///
/// ```ignore
/// let positional = params![1, "ann"];
/// let named = params! { id = 1, name = "ann" };
/// ```
#[macro_export]
macro_rules! params {
    () => {
        $crate::Params::Positional(::std::vec::Vec::new())
    };
    ($($name:ident = $value:expr),+ $(,)?) => {
        $crate::Params::Named(::std::vec![
            $((::std::string::String::from(stringify!($name)), $crate::Value::from($value))),+
        ])
    };
    ($($value:expr),+ $(,)?) => {
        $crate::Params::Positional(::std::vec![$($crate::Value::from($value)),+])
    };
}

/// Collects parameter values while a statement renders.
///
/// Every parameter receives a unique name, even in positional styles, so
/// values can be read back by name or by position.
#[derive(Debug, Clone)]
pub struct ParameterCollector {
    style: ParamStyle,
    names: Vec<String>,
    values: Vec<Value>,
}

impl ParameterCollector {
    pub fn new(style: ParamStyle) -> Self {
        Self {
            style,
            names: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Pre-seed the collector with caller-supplied parameters.
    ///
    /// Named styles require a mapping; positional styles accept either shape.
    pub fn with_params(style: ParamStyle, params: Params) -> OrmResult<Self> {
        let mut collector = Self::new(style);
        match params {
            Params::Positional(values) => {
                if style.is_named() && !values.is_empty() {
                    return Err(OrmError::parameter(format!(
                        "paramstyle is {style}, a mapping must be provided as params"
                    )));
                }
                for (i, value) in values.into_iter().enumerate() {
                    collector.names.push(format!("param_{}", i + 1));
                    collector.values.push(value);
                }
            }
            Params::Named(entries) => {
                for (name, value) in entries {
                    if collector.contains(&name) {
                        return Err(OrmError::parameter(format!(
                            "duplicate parameter '{name}'"
                        )));
                    }
                    collector.names.push(name);
                    collector.values.push(value);
                }
            }
        }
        Ok(collector)
    }

    pub fn style(&self) -> ParamStyle {
        self.style
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    fn unique_name(&self, name: Option<&str>) -> String {
        match name {
            Some(name) if !name.is_empty() && !self.contains(name) => name.to_string(),
            Some(name) if !name.is_empty() => {
                let mut i = 2;
                while self.contains(&format!("{name}_{i}")) {
                    i += 1;
                }
                format!("{name}_{i}")
            }
            _ => {
                let mut i = 1;
                while self.contains(&format!("param_{i}")) {
                    i += 1;
                }
                format!("param_{i}")
            }
        }
    }

    /// Add a parameter and return its placeholder text.
    pub fn add(&mut self, value: impl Into<Value>, name: Option<&str>) -> String {
        let name = self.unique_name(name);
        let placeholder = self.style.placeholder(self.values.len(), &name);
        self.names.push(name);
        self.values.push(value.into());
        placeholder
    }

    /// Placeholder text referencing an already-collected parameter.
    pub fn placeholder_for(&self, name: &str) -> OrmResult<String> {
        let index = self
            .names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| OrmError::parameter(format!("Missing parameter '{name}'")))?;
        Ok(self.style.placeholder(index, name))
    }

    /// Value of the named parameter.
    pub fn get(&self, name: &str) -> OrmResult<&Value> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|idx| self.values.get(idx))
            .ok_or_else(|| OrmError::parameter(format!("Missing parameter '{name}'")))
    }

    /// Value of the parameter at `idx`.
    pub fn index(&self, idx: usize) -> OrmResult<&Value> {
        self.values.get(idx).ok_or_else(|| {
            OrmError::parameter(format!(
                "parameter index {idx} out of bounds ({} collected)",
                self.values.len()
            ))
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Finish collection, producing the container shape of the paramstyle.
    pub fn into_params(self) -> Params {
        if self.style.is_named() {
            Params::Named(self.names.into_iter().zip(self.values).collect())
        } else {
            Params::Positional(self.values)
        }
    }
}
