// executor.rs — ActionExecutor: the agent-supplied effect.
//
// The kernel never knows what an action does. It hands the action type and
// payload to an executor once every constraint has been checked and the
// cost charged, and records whatever comes back.

use serde_json::Value;

/// Performs an agent action after the kernel has admitted it.
///
/// Implementations must be shareable across threads; the kernel may run
/// actions for several agents at once.
pub trait ActionExecutor: Send + Sync {
    fn execute(&self, action_type: &str, payload: &Value) -> anyhow::Result<Value>;
}

impl<F> ActionExecutor for F
where
    F: Fn(&str, &Value) -> anyhow::Result<Value> + Send + Sync,
{
    fn execute(&self, action_type: &str, payload: &Value) -> anyhow::Result<Value> {
        self(action_type, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    impl ActionExecutor for Echo {
        fn execute(&self, action_type: &str, payload: &Value) -> anyhow::Result<Value> {
            Ok(json!({ "type": action_type, "echo": payload }))
        }
    }

    #[test]
    fn struct_and_closure_executors() {
        let boxed: Vec<Box<dyn ActionExecutor>> = vec![
            Box::new(Echo),
            Box::new(|action_type: &str, _: &Value| -> anyhow::Result<Value> {
                anyhow::bail!("{action_type} unsupported")
            }),
        ];
        let out = boxed[0].execute("read", &json!({"k": 1})).unwrap();
        assert_eq!(out["echo"]["k"], 1);
        let err = boxed[1].execute("write", &Value::Null).unwrap_err();
        assert_eq!(err.to_string(), "write unsupported");
    }
}
