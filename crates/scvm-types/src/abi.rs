use crate::error::TypesError;
use serde::{Deserialize, Serialize};

/// Name of the implicit fallback function.
pub const DEFAULT_FUNCTION: &str = "default";
/// Name of the deploy-time constructor.
pub const CONSTRUCTOR: &str = "constructor";
/// Name of the fee delegation check function.
pub const CHECK_DELEGATION_FUNCTION: &str = "check_delegation";

/// Contract interface published alongside the bytecode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Abi {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default, rename = "state_variables")]
    pub state_variables: Vec<StateVar>,
}

/// Exported contract function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<FnArgument>,
    #[serde(default)]
    pub view: bool,
    #[serde(default)]
    pub payable: bool,
    #[serde(default, rename = "fee_delegation")]
    pub fee_delegation: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FnArgument {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateVar {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub len: i32,
}

impl Abi {
    pub fn from_json(bytes: &[u8]) -> Result<Self, TypesError> {
        serde_json::from_slice(bytes).map_err(|e| TypesError::InvalidAbi(e.to_string()))
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Resolves a callable function: an exact match, then `default` for an
    /// empty name. Constructors resolve to `None` when undeclared.
    pub fn resolve(&self, name: &str, constructor: bool) -> Result<Option<&Function>, String> {
        if let Some(f) = self.function(name) {
            return Ok(Some(f));
        }
        if constructor {
            return Ok(None);
        }
        if name.is_empty() {
            if let Some(f) = self.function(DEFAULT_FUNCTION) {
                return Ok(Some(f));
            }
        }
        Err(format!("not found function: {}", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "version": "0.2",
        "language": "lua",
        "functions": [
            {"name": "add", "arguments": [{"name": "a"}, {"name": "b"}]},
            {"name": "get", "arguments": [], "view": true},
            {"name": "default", "payable": true},
            {"name": "pay", "payable": true, "fee_delegation": true}
        ],
        "state_variables": [{"name": "total", "type": "value"}]
    }"#;

    #[test]
    fn test_parse_abi() {
        let abi = Abi::from_json(SAMPLE.as_bytes()).unwrap();
        assert_eq!(abi.functions.len(), 4);
        assert!(abi.function("get").unwrap().view);
        assert!(abi.function("pay").unwrap().fee_delegation);
        assert_eq!(abi.state_variables[0].kind, "value");
    }

    #[test]
    fn test_resolve() {
        let abi = Abi::from_json(SAMPLE.as_bytes()).unwrap();
        assert_eq!(abi.resolve("add", false).unwrap().unwrap().name, "add");
        assert_eq!(abi.resolve("", false).unwrap().unwrap().name, "default");
        assert!(abi.resolve(CONSTRUCTOR, true).unwrap().is_none());
        assert_eq!(abi.resolve("nope", false).unwrap_err(), "not found function: nope");
    }

    #[test]
    fn test_invalid_abi() {
        assert!(Abi::from_json(b"not json").is_err());
    }
}
