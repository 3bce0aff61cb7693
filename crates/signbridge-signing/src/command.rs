//! Command construction for the external signing module
//!
//! A [`BackendCommand`] has two halves: the script text, which is safe to log,
//! and a list of [`Substitution`]s that reach the subprocess only as
//! environment variables. Anything secret or attacker-influenced that must
//! arrive verbatim (tokens, branch names, commit ids) goes through a
//! substitution and is referenced from the script as `$env:Name`.

use std::fmt;

/// A named value handed to the subprocess out-of-band
#[derive(Clone, PartialEq, Eq)]
pub struct Substitution {
    name: String,
    value: String,
}

impl Substitution {
    /// Create a substitution
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Environment variable name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value bound into the child's environment
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for Substitution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Substitution")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// A finished command: script text plus its out-of-band substitutions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCommand {
    text: String,
    substitutions: Vec<Substitution>,
}

impl BackendCommand {
    /// Script text; contains no substitution values
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Substitutions in the order they were appended
    pub fn substitutions(&self) -> &[Substitution] {
        &self.substitutions
    }

    /// Substitution names, for logging
    pub fn substitution_names(&self) -> Vec<&str> {
        self.substitutions.iter().map(Substitution::name).collect()
    }
}

impl fmt::Display for BackendCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Builds a PowerShell cmdlet invocation one argument at a time
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    text: String,
    substitutions: Vec<Substitution>,
}

impl CommandBuilder {
    /// Start a command for the given cmdlet
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            text: operation.into(),
            substitutions: Vec::new(),
        }
    }

    /// Append `-Name "value"` with the value escaped for a double-quoted string
    pub fn append_parameter(&mut self, name: &str, value: &str) -> &mut Self {
        self.text.push_str(" -");
        self.text.push_str(name);
        self.text.push_str(" \"");
        self.text.push_str(&escape(value));
        self.text.push('"');
        self
    }

    /// Append a switch parameter
    pub fn append_flag(&mut self, name: &str) -> &mut Self {
        self.text.push_str(" -");
        self.text.push_str(name);
        self
    }

    /// Append a raw fragment plus the substitutions it references
    pub fn append_custom(
        &mut self,
        fragment: &str,
        substitutions: impl IntoIterator<Item = Substitution>,
    ) -> &mut Self {
        self.text.push(' ');
        self.text.push_str(fragment);
        self.substitutions.extend(substitutions);
        self
    }

    /// Finish the command
    pub fn build(&self) -> BackendCommand {
        BackendCommand {
            text: self.text.clone(),
            substitutions: self.substitutions.clone(),
        }
    }
}

/// Escape a value for a PowerShell double-quoted string.
///
/// The backtick is PowerShell's escape character; PowerShell also treats the
/// typographic double quotes as string delimiters.
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '`' | '"' | '$' | '\u{201C}' | '\u{201D}' | '\u{201E}') {
            escaped.push('`');
        }
        escaped.push(c);
    }
    escaped
}
