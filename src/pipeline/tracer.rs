use std::fmt;

/// The flattened, ordered list of node names in an assembled pipeline.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineTracer {
    path: Vec<String>,
}

impl PipelineTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_to_path(&mut self, name: impl Into<String>) {
        self.path.push(name.into());
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }
}

/// Renders as `A | B | C |`.
impl fmt::Display for PipelineTracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, name) in self.path.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            f.write_str(name)?;
        }
        if !self.path.is_empty() {
            f.write_str(" |")?;
        }
        Ok(())
    }
}
