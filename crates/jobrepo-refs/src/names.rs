//! Ref name validation and per-job namespacing.
//!
//! Valid ref names follow git-style conventions:
//! - Must be non-empty
//! - Must not contain whitespace, `~`, `^`, `:`, `?`, `*`, `[`, `\`
//! - Must not contain `..` (double dot) or `@{`
//! - Must not start or end with `/`, and no component may start with `.`
//! - Must not end with `.lock`
//! - Components between slashes must be non-empty

use crate::error::{RefError, Result};

/// Characters that are forbidden anywhere in a ref name.
const FORBIDDEN_CHARS: &[char] = &[' ', '\t', '\n', '\r', '~', '^', ':', '?', '*', '[', '\\'];

fn invalid(name: &str, reason: impl Into<String>) -> RefError {
    RefError::InvalidRefName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Validate a (possibly hierarchical) ref name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use jobrepo_refs::names::validate_ref_name;
///
/// assert!(validate_ref_name("master").is_ok());
/// assert!(validate_ref_name("tower-a/refs/heads/master").is_ok());
/// assert!(validate_ref_name("").is_err());
/// assert!(validate_ref_name("bad..name").is_err());
/// ```
pub fn validate_ref_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(name, "ref name must not be empty"));
    }

    if let Some(ch) = FORBIDDEN_CHARS.iter().find(|ch| name.contains(**ch)) {
        return Err(invalid(name, format!("contains forbidden character: {ch:?}")));
    }
    if name.chars().any(char::is_control) {
        return Err(invalid(name, "contains a control character"));
    }
    if name.contains("..") {
        return Err(invalid(name, "must not contain '..'"));
    }
    if name.contains("@{") {
        return Err(invalid(name, "must not contain '@{'"));
    }
    if name.ends_with('.') {
        return Err(invalid(name, "must not end with '.'"));
    }
    if name.ends_with(".lock") {
        return Err(invalid(name, "must not end with '.lock'"));
    }

    for component in name.split('/') {
        if component.is_empty() {
            return Err(invalid(name, "path components must not be empty"));
        }
        if component.starts_with('.') {
            return Err(invalid(
                name,
                format!("component must not start with '.': {component:?}"),
            ));
        }
    }

    Ok(())
}

/// Validate a single path component (a namespace prefix). No slashes allowed.
pub fn validate_component(name: &str) -> Result<()> {
    if name.contains('/') {
        return Err(invalid(name, "must not contain '/'"));
    }
    validate_ref_name(name)
}

/// The per-job ref namespace.
///
/// Every job keeps its history under its own prefix (derived from the job's
/// shortname) so several independent repositories can share one ref store.
/// A branch `master` of job `tower-a` lives at `tower-a/refs/heads/master`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RefNamespace {
    prefix: String,
}

impl RefNamespace {
    /// Create the namespace for a job shortname.
    pub fn new(prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        validate_component(&prefix)?;
        Ok(Self { prefix })
    }

    /// The namespace prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Fully qualified name for a branch in this namespace.
    pub fn qualify(&self, branch: &str) -> Result<String> {
        validate_ref_name(branch)?;
        Ok(format!("{}/refs/heads/{branch}", self.prefix))
    }

    /// The prefix under which all of this namespace's branches live.
    pub fn heads_prefix(&self) -> String {
        format!("{}/refs/heads/", self.prefix)
    }

    /// Strip the namespace from a fully qualified branch ref.
    pub fn branch_of<'a>(&self, full: &'a str) -> Option<&'a str> {
        full.strip_prefix(&self.prefix)?
            .strip_prefix("/refs/heads/")
            .filter(|b| !b.is_empty())
    }
}

impl std::fmt::Display for RefNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(validate_ref_name("master").is_ok());
        assert!(validate_ref_name("v1.0").is_ok());
        assert!(validate_ref_name("job-1/refs/heads/master").is_ok());
    }

    #[test]
    fn reject_empty_and_traversal() {
        assert!(validate_ref_name("").is_err());
        assert!(validate_ref_name("a..b").is_err());
        assert!(validate_ref_name("../escape").is_err());
        assert!(validate_ref_name("a//b").is_err());
        assert!(validate_ref_name("/abs").is_err());
        assert!(validate_ref_name("trailing/").is_err());
    }

    #[test]
    fn reject_forbidden_chars() {
        for bad in ["a b", "a~b", "a^b", "a:b", "a?b", "a*b", "a[b", "a\\b", "a\u{7}b"] {
            assert!(validate_ref_name(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn reject_lock_and_hidden() {
        assert!(validate_ref_name("master.lock").is_err());
        assert!(validate_ref_name(".hidden").is_err());
        assert!(validate_ref_name("a/.hidden").is_err());
        assert!(validate_ref_name("a@{1}").is_err());
    }

    #[test]
    fn namespace_qualifies_branches() {
        let ns = RefNamespace::new("tower-a").unwrap();
        let full = ns.qualify("master").unwrap();
        assert_eq!(full, "tower-a/refs/heads/master");
        assert_eq!(ns.branch_of(&full), Some("master"));
        assert!(full.starts_with(&ns.heads_prefix()));
    }

    #[test]
    fn namespace_rejects_slashes() {
        assert!(RefNamespace::new("a/b").is_err());
        assert!(RefNamespace::new("").is_err());
    }

    #[test]
    fn branch_of_other_namespace_is_none() {
        let ns = RefNamespace::new("tower-a").unwrap();
        assert_eq!(ns.branch_of("tower-b/refs/heads/master"), None);
        assert_eq!(ns.branch_of("tower-a/refs/heads/"), None);
    }
}
