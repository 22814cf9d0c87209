//! Anchored regular-language patterns for registry reference grammar.
//!
//! Mirrors the atom/composite decomposition of the distribution spec's reference
//! grammar: alphanumeric components joined by separators form name components,
//! domain components joined by dots (with an optional port) form a domain, and a
//! full reference is `name(:tag)?(@digest)?`.

use once_cell::sync::Lazy;
use regex::Regex;

const ALPHA_NUMERIC: &str = "[a-z0-9]+";
const SEPARATOR: &str = "(?:[._]|__|[-]+)";
const DOMAIN_COMPONENT: &str = "[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?";
const TAG: &str = r"[\w][\w.-]{0,127}";
const DIGEST: &str = "[A-Za-z][A-Za-z0-9]*(?:[-_+.][A-Za-z][A-Za-z0-9]*)*:[0-9a-fA-F]{32,}";

fn name_component() -> String {
    format!("{a}(?:{s}{a})*", a = ALPHA_NUMERIC, s = SEPARATOR)
}

fn domain() -> String {
    format!(
        "{c}(?:\\.{c})*(?::[0-9]+)?",
        c = DOMAIN_COMPONENT
    )
}

fn name() -> String {
    format!(
        "(?:{d}/)?{nc}(?:/{nc})*",
        d = domain(),
        nc = name_component()
    )
}

fn reference() -> String {
    format!("{n}(?::{t})?(?:@{dg})?", n = name(), t = TAG, dg = DIGEST)
}

fn anchored(pattern: &str) -> Regex {
    Regex::new(&format!("^{}$", pattern)).expect("reference grammar pattern must compile")
}

pub static DOMAIN_PAT: Lazy<Regex> = Lazy::new(|| anchored(&domain()));
pub static NAME_PAT: Lazy<Regex> = Lazy::new(|| anchored(&name()));
pub static TAG_PAT: Lazy<Regex> = Lazy::new(|| anchored(TAG));
pub static DIGEST_PAT: Lazy<Regex> = Lazy::new(|| anchored(DIGEST));
pub static REFERENCE_PAT: Lazy<Regex> = Lazy::new(|| anchored(&reference()));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_canonical_reference() {
        assert!(REFERENCE_PAT.is_match("quay.io/ibm/software/cloudpak/hello-world:latest"));
    }

    #[test]
    fn accepts_digest_reference() {
        assert!(REFERENCE_PAT.is_match(
            "this.is/a/valid/image:v1.2.3@sha256:f5d2c6a1e0c86e4234ea601552dbabb4ced0e013a1efcbfb439f1f6a7a9275b0"
        ));
    }

    #[test]
    fn rejects_empty_component() {
        assert!(!REFERENCE_PAT.is_match("quay.io//hello:latest"));
        assert!(!NAME_PAT.is_match(""));
    }

    #[test]
    fn domain_pattern_requires_alphanumeric_edges() {
        assert!(DOMAIN_PAT.is_match("registry-1.docker.io"));
        assert!(!DOMAIN_PAT.is_match("-docker.io"));
    }

    #[test]
    fn digest_pattern_matches_sha256() {
        assert!(DIGEST_PAT.is_match(
            "sha256:f5d2c6a1e0c86e4234ea601552dbabb4ced0e013a1efcbfb439f1f6a7a9275b0"
        ));
        assert!(!DIGEST_PAT.is_match("sha256:tooshort"));
    }

    #[test]
    fn tag_pattern_allows_dots_dashes_underscores() {
        assert!(TAG_PAT.is_match("v1.2.3-rc1_build"));
        assert!(!TAG_PAT.is_match(".leadingdot"));
    }
}
