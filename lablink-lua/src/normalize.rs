//! Source normalization
//!
//! Downloaded programs are generated by the server and may lag behind or run
//! ahead of the runtime on the brick. Before a program is compiled it goes
//! through a [`Normalizer`] that papers over that drift with plain textual
//! rewrites.

/// Textual rewrite applied once to every downloaded program
pub trait Normalizer: Send + Sync {
    fn normalize(&self, source: &str) -> String;
}

/// Default normalizer
///
/// In order:
/// 1. CRLF line endings become LF
/// 2. A leading `#!` interpreter line is dropped (Lua cannot parse it)
/// 3. Each literal rewrite rule is applied, in registration order
#[derive(Debug, Clone, Default)]
pub struct SourceNormalizer {
    rules: Vec<(String, String)>,
}

impl SourceNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a literal `from` -> `to` rewrite
    pub fn with_rule(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        if !from.is_empty() {
            self.rules.push((from, to.into()));
        }
        self
    }

    pub fn rules(&self) -> &[(String, String)] {
        &self.rules
    }
}

impl Normalizer for SourceNormalizer {
    fn normalize(&self, source: &str) -> String {
        let mut code = source.replace("\r\n", "\n");

        if code.starts_with("#!") {
            code = match code.split_once('\n') {
                Some((_, rest)) => rest.to_string(),
                None => String::new(),
            };
        }

        for (from, to) in &self.rules {
            code = code.replace(from.as_str(), to);
        }

        code
    }
}
