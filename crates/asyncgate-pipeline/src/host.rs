use crate::middleware::SharedMiddleware;

/// An application that route pipelines can be mounted on.
///
/// Matching and ordering semantics belong to the host. Mounting the same
/// pattern twice registers two independent chains.
pub trait Host {
    fn mount(&mut self, pattern: &str, stages: Vec<SharedMiddleware>);
}

/// Records mounts in order. Handy for inspecting a compilation.
impl Host for Vec<(String, Vec<SharedMiddleware>)> {
    fn mount(&mut self, pattern: &str, stages: Vec<SharedMiddleware>) {
        self.push((pattern.to_string(), stages));
    }
}
