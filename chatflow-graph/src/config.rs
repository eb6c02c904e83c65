/// Bounds for one graph invocation. `max_steps` guards against unbounded
/// condition loops in graphs built from untrusted configuration.
#[derive(Clone, Debug)]
pub struct ExecutionConfig {
    pub max_steps: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self { max_steps: 100 }
    }
}

impl ExecutionConfig {
    pub fn with_max_steps(max_steps: usize) -> Self {
        Self { max_steps }
    }
}
