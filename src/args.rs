//! Dynamic call arguments carried through every pipeline phase.

use serde_json::{Map, Value};

/// Positional and keyword arguments for one invocation of a wrapped callable.
///
/// Payloads are dynamically typed [`serde_json::Value`]s; every callback in
/// every phase sees the same arguments the caller passed to the pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    positional: Vec<Value>,
    keyword: Map<String, Value>,
}

impl CallArgs {
    /// An empty argument list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from positional values only.
    pub fn positional(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            positional: values.into_iter().collect(),
            keyword: Map::new(),
        }
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Set a keyword argument.
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.insert(key.into(), value.into());
        self
    }

    /// Positional argument at `index`, if present.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// Keyword argument under `key`, if present.
    pub fn kw(&self, key: &str) -> Option<&Value> {
        self.keyword.get(key)
    }

    /// All positional arguments in call order.
    pub fn positional_args(&self) -> &[Value] {
        &self.positional
    }

    /// All keyword arguments.
    pub fn keyword_args(&self) -> &Map<String, Value> {
        &self.keyword
    }

    /// Number of positional arguments.
    pub fn len(&self) -> usize {
        self.positional.len()
    }

    /// True when there are no positional and no keyword arguments.
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_accumulates_in_order() {
        let args = CallArgs::new().arg(1).arg("two").kwarg("mode", "fast");
        assert_eq!(args.get(0), Some(&json!(1)));
        assert_eq!(args.get(1), Some(&json!("two")));
        assert_eq!(args.kw("mode"), Some(&json!("fast")));
        assert_eq!(args.len(), 2);
        assert!(!args.is_empty());
    }

    #[test]
    fn empty_args() {
        let args = CallArgs::new();
        assert!(args.is_empty());
        assert_eq!(args.get(0), None);
        assert_eq!(args.kw("missing"), None);
    }

    #[test]
    fn positional_constructor() {
        let args = CallArgs::positional([json!(5), json!(false)]);
        assert_eq!(args.positional_args(), &[json!(5), json!(false)]);
    }
}
