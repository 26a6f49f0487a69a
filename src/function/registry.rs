use std::{collections::HashMap, fmt, sync::Arc};

use thiserror::Error;
use tracing::debug;

use super::types::{Function, FunctionImpl, NativeFunction, Signature};
use super::{crypto, encoding, lookup, logic, network, text, time};
use crate::eval::{EvalError, EvalResult, EvaluationContext, Value};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("function already registered: {0}")]
    Duplicate(String),
}

/// Immutable name -> function table shared by every request.
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn Function>>,
    debug: bool,
}

impl FunctionRegistry {
    pub fn builder() -> FunctionRegistryBuilder {
        FunctionRegistryBuilder::default()
    }

    /// The built-in function library.
    pub fn standard(debug: bool) -> Arc<Self> {
        Arc::new(Self::builder().debug(debug).with_standard_library().build())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Function>> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug
    }

    /// Verifies that `name` exists and accepts `arity` arguments.
    pub fn check_call(&self, name: &str, arity: usize) -> EvalResult<()> {
        let function = self
            .get(name)
            .ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?;
        function
            .signature()
            .check_arity(arity)
            .map_err(|source| EvalError::Function {
                function: name.to_string(),
                source,
            })
    }

    pub fn call(
        &self,
        name: &str,
        args: &[Value],
        context: &EvaluationContext,
    ) -> EvalResult<Value> {
        let function = self
            .get(name)
            .ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?;
        let signature = function.signature();
        let wrap = |source| EvalError::Function {
            function: name.to_string(),
            source,
        };

        let args = signature.convert_args(args).map_err(wrap)?;
        let result = function.call(&args, context).map_err(wrap)?;
        if self.debug {
            debug!(
                request_id = %context.id(),
                "{}({}) = {}",
                name,
                render_args(signature, &args),
                result
            );
        }
        Ok(result)
    }
}

fn render_args(signature: &Signature, args: &[Value]) -> String {
    args.iter()
        .enumerate()
        .map(|(index, arg)| match signature.param_at(index) {
            Some(param) if param.sensitive => "<redacted>".to_string(),
            _ => format!("{:?}", arg.to_string()),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .field("debug", &self.debug)
            .finish()
    }
}

#[derive(Default)]
pub struct FunctionRegistryBuilder {
    functions: HashMap<String, Arc<dyn Function>>,
    debug: bool,
}

impl FunctionRegistryBuilder {
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn register(&mut self, function: Arc<dyn Function>) -> Result<&mut Self, RegistryError> {
        let name = function.signature().name;
        if self.functions.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        self.functions.insert(name.to_string(), function);
        Ok(self)
    }

    /// Adds the built-in functions, replacing any earlier entries of the same name.
    pub fn with_standard_library(mut self) -> Self {
        lookup::register(&mut self);
        crypto::register(&mut self);
        network::register(&mut self);
        text::register(&mut self);
        logic::register(&mut self);
        time::register(&mut self);
        encoding::register(&mut self);
        self
    }

    pub(crate) fn native(&mut self, signature: Signature, implementation: FunctionImpl) {
        self.functions.insert(
            signature.name.to_string(),
            Arc::new(NativeFunction::new(signature, implementation)),
        );
    }

    pub fn build(self) -> FunctionRegistry {
        FunctionRegistry {
            functions: self.functions,
            debug: self.debug,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::ValueKind;
    use crate::function::{FunctionError, ParamType};

    const STANDARD: &[&str] = &[
        "all",
        "and",
        "any",
        "base64decode",
        "base64encode",
        "cidr",
        "concat",
        "contains",
        "debug",
        "duration",
        "eq",
        "find",
        "float",
        "format",
        "ge",
        "getenv",
        "gt",
        "header",
        "join",
        "le",
        "len",
        "lower",
        "lt",
        "match",
        "ne",
        "not",
        "or",
        "param",
        "payload",
        "readfile",
        "sha1",
        "sha256",
        "sha512",
        "since",
        "upper",
        "url",
    ];

    #[test]
    fn test_standard_library_names() {
        let registry = FunctionRegistry::standard(false);
        assert_eq!(registry.names(), STANDARD);
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        fn constant(_: &[Value], _: &EvaluationContext) -> Result<Value, FunctionError> {
            Ok(Value::Boolean(true))
        }
        let signature = Signature::new("always").returns(ValueKind::Bool);
        let mut builder = FunctionRegistry::builder();
        builder
            .register(Arc::new(NativeFunction::new(signature.clone(), constant)))
            .unwrap();
        let err = builder
            .register(Arc::new(NativeFunction::new(signature, constant)))
            .err();
        assert_eq!(err, Some(RegistryError::Duplicate("always".to_string())));
    }

    #[test]
    fn test_call_checks_signature() {
        let registry = FunctionRegistry::standard(false);
        let context = EvaluationContext::new(registry.clone());

        let err = registry.call("upper", &[], &context).unwrap_err();
        assert!(matches!(
            err,
            EvalError::Function {
                source: FunctionError::Arity { got: 0, .. },
                ..
            }
        ));
        assert_eq!(
            registry.call("upper", &[Value::from("abc")], &context),
            Ok(Value::from("ABC"))
        );
        assert!(registry.check_call("sha256", 2).is_ok());
        assert!(registry.check_call("sha256", 1).is_err());
        assert!(matches!(
            registry.check_call("sha384", 2),
            Err(EvalError::UnknownFunction(_))
        ));
    }

    #[test]
    fn test_custom_function() {
        fn shout(args: &[Value], _: &EvaluationContext) -> Result<Value, FunctionError> {
            Ok(Value::String(format!("{}!", args[0])))
        }
        let mut builder = FunctionRegistry::builder();
        builder
            .register(Arc::new(NativeFunction::new(
                Signature::new("shout").param("s", ParamType::String),
                shout,
            )))
            .unwrap();
        let registry = Arc::new(builder.build());
        let context = EvaluationContext::new(registry.clone());
        assert_eq!(
            registry.call("shout", &[Value::Integer(3)], &context),
            Ok(Value::from("3!"))
        );
    }
}
