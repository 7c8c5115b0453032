//! Version numbers and pip-style version specifiers.
//!
//! A version is a dotted release (`2.1.3`) with an optional trailing tag
//! segment (`2.1.post2`, `0.1.alpha`, `1.0.rc1`). Pre-release tags order
//! before the bare release, `post` tags after it.

use std::{cmp::Ordering, fmt, str::FromStr};

use anyhow::bail;

// ── Version ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Version {
    release: Vec<u64>,
    tag: Option<Tag>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Alpha(u64),
    Beta(u64),
    Rc(u64),
    Post(u64),
}

impl Tag {
    /// Ordering rank relative to the bare release, which sits at 3.
    fn rank(self) -> u8 {
        match self {
            Self::Alpha(_) => 0,
            Self::Beta(_) => 1,
            Self::Rc(_) => 2,
            Self::Post(_) => 4,
        }
    }

    fn number(self) -> u64 {
        match self {
            Self::Alpha(n) | Self::Beta(n) | Self::Rc(n) | Self::Post(n) => n,
        }
    }

    fn parse(segment: &str) -> Option<Self> {
        for (prefix, ctor) in [
            ("alpha", Self::Alpha as fn(u64) -> Self),
            ("beta", Self::Beta),
            ("rc", Self::Rc),
            ("post", Self::Post),
        ] {
            if let Some(rest) = segment.strip_prefix(prefix) {
                if rest.is_empty() {
                    return Some(ctor(0));
                }
                if let Ok(n) = rest.parse::<u64>() {
                    return Some(ctor(n));
                }
            }
        }
        None
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Alpha(_) => "alpha",
            Self::Beta(_) => "beta",
            Self::Rc(_) => "rc",
            Self::Post(_) => "post",
        };
        match self.number() {
            0 => write!(f, "{label}"),
            n => write!(f, "{label}{n}"),
        }
    }
}

impl Version {
    pub fn new(release: impl Into<Vec<u64>>) -> Self {
        Self {
            release: release.into(),
            tag: None,
        }
    }
}

impl FromStr for Version {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            bail!("empty version string");
        }

        let mut release = Vec::new();
        let mut tag = None;
        let segments: Vec<&str> = s.split('.').collect();
        for (i, segment) in segments.iter().enumerate() {
            if let Ok(n) = segment.parse::<u64>() {
                release.push(n);
                continue;
            }
            // A non-numeric segment must be the trailing tag.
            if i != segments.len() - 1 {
                bail!("invalid version '{s}': unexpected segment '{segment}'");
            }
            tag = Tag::parse(segment);
            if tag.is_none() {
                bail!("invalid version '{s}': unknown tag '{segment}'");
            }
        }
        if release.is_empty() {
            bail!("invalid version '{s}': no numeric release segments");
        }
        Ok(Self { release, tag })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let release = self
            .release
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".");
        match self.tag {
            Some(tag) => write!(f, "{release}.{tag}"),
            None => write!(f, "{release}"),
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // Compare releases element-wise, treating missing segments as zero
        // (so `2.1` == `2.1.0`).
        let len = self.release.len().max(other.release.len());
        for i in 0..len {
            let a = self.release.get(i).copied().unwrap_or(0);
            let b = other.release.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => {},
                ordering => return ordering,
            }
        }

        let rank = |tag: Option<Tag>| tag.map_or(3, Tag::rank);
        rank(self.tag)
            .cmp(&rank(other.tag))
            .then_with(|| {
                self.tag
                    .map_or(0, Tag::number)
                    .cmp(&other.tag.map_or(0, Tag::number))
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Equality must agree with `Ord` (`2.1` == `2.1.0`), so it cannot be
// derived field-wise.
impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

// ── Version specifiers ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ge,
    Le,
    Gt,
    Lt,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::Eq => "==",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Lt => "<",
        };
        write!(f, "{op}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSpecifier {
    pub op: CmpOp,
    pub version: Version,
}

impl VersionSpecifier {
    pub fn matches(&self, candidate: &Version) -> bool {
        match self.op {
            CmpOp::Eq => candidate == &self.version,
            CmpOp::Ge => candidate >= &self.version,
            CmpOp::Le => candidate <= &self.version,
            CmpOp::Gt => candidate > &self.version,
            CmpOp::Lt => candidate < &self.version,
        }
    }
}

impl fmt::Display for VersionSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op, self.version)
    }
}

// ── PluginRequest ───────────────────────────────────────────────────────────

/// A plugin descriptor: a package name with an optional version specifier,
/// e.g. `foo`, `foo==1.0`, `foo >=1.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRequest {
    pub name: String,
    pub specifier: Option<VersionSpecifier>,
}

/// Validate a package name: alphanumeric start, then alphanumerics, dots,
/// underscores, and hyphens.
pub fn validate_package_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {},
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
}

impl PluginRequest {
    /// A bare request with no version constraint.
    pub fn unconstrained(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            specifier: None,
        }
    }

    /// Returns true if the candidate version satisfies this request.
    pub fn matches(&self, candidate: &Version) -> bool {
        self.specifier
            .as_ref()
            .is_none_or(|spec| spec.matches(candidate))
    }
}

impl FromStr for PluginRequest {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        // Two-character operators first so `>=` is not read as `>` + `=1.0`.
        let ops = [
            ("==", CmpOp::Eq),
            (">=", CmpOp::Ge),
            ("<=", CmpOp::Le),
            (">", CmpOp::Gt),
            ("<", CmpOp::Lt),
        ];

        let (name, specifier) = match ops.iter().find_map(|(token, op)| {
            s.find(token).map(|at| (at, *token, *op))
        }) {
            Some((at, token, op)) => {
                let name = s[..at].trim();
                let version = s[at + token.len()..].trim().parse::<Version>()?;
                (name, Some(VersionSpecifier { op, version }))
            },
            None => (s, None),
        };

        if !validate_package_name(name) {
            bail!(
                "invalid plugin descriptor '{s}': expected a name like \"foo\", \
                 \"foo==1.0\", or \"foo>=1.0\""
            );
        }

        Ok(Self {
            name: name.to_string(),
            specifier,
        })
    }
}

impl fmt::Display for PluginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.specifier {
            Some(spec) => write!(f, "{}{spec}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn parse_plain_versions() {
        assert_eq!(v("1.2.3"), Version::new(vec![1, 2, 3]));
        assert_eq!(v("0.1"), Version::new(vec![0, 1]));
    }

    #[test]
    fn parse_tagged_versions() {
        assert_eq!(v("2.1.post2").to_string(), "2.1.post2");
        assert_eq!(v("0.1.alpha").to_string(), "0.1.alpha");
        assert_eq!(v("1.0.rc1").to_string(), "1.0.rc1");
    }

    #[test]
    fn invalid_versions_rejected() {
        assert!("".parse::<Version>().is_err());
        assert!("abc".parse::<Version>().is_err());
        assert!("1.weird.2".parse::<Version>().is_err());
        assert!("1.0.banana".parse::<Version>().is_err());
    }

    #[test]
    fn version_ordering() {
        assert!(v("2.1") < v("2.1.post2"));
        assert!(v("1.0.alpha") < v("1.0"));
        assert!(v("1.0.alpha") < v("1.0.beta"));
        assert!(v("1.0.rc1") < v("1.0"));
        assert!(v("1.0.post1") < v("1.0.post2"));
        assert!(v("0.9") < v("0.10"));
        assert!(v("2.1") == v("2.1.0"));
        assert!(v("1.2") < v("1.10"));
    }

    #[test]
    fn specifier_matching() {
        let req: PluginRequest = "foo>=1.0".parse().unwrap();
        assert!(req.matches(&v("1.0")));
        assert!(req.matches(&v("2.0")));
        assert!(!req.matches(&v("0.9")));

        let req: PluginRequest = "foo==1.0.post1".parse().unwrap();
        assert!(req.matches(&v("1.0.post1")));
        assert!(!req.matches(&v("1.0")));

        let req: PluginRequest = "foo<2.0".parse().unwrap();
        assert!(req.matches(&v("1.9")));
        assert!(!req.matches(&v("2.0")));
    }

    #[test]
    fn parse_request_without_specifier() {
        let req: PluginRequest = "microdrop.dmf-device-ui-plugin".parse().unwrap();
        assert_eq!(req.name, "microdrop.dmf-device-ui-plugin");
        assert!(req.specifier.is_none());
        assert!(req.matches(&v("0.1")));
    }

    #[test]
    fn parse_request_tolerates_whitespace() {
        let req: PluginRequest = "  foo >= 1.0.5 ".parse().unwrap();
        assert_eq!(req.name, "foo");
        assert_eq!(req.to_string(), "foo>=1.0.5");
    }

    #[test]
    fn parse_request_rejects_bad_descriptors() {
        assert!("".parse::<PluginRequest>().is_err());
        assert!("-leading-dash".parse::<PluginRequest>().is_err());
        assert!("foo==".parse::<PluginRequest>().is_err());
        assert!("foo==not.a.version".parse::<PluginRequest>().is_err());
        assert!("has space==1.0".parse::<PluginRequest>().is_err());
    }

    #[test]
    fn validate_names() {
        assert!(validate_package_name("microdrop.droplet-planning-plugin"));
        assert!(validate_package_name("foo_bar"));
        assert!(!validate_package_name(""));
        assert!(!validate_package_name(".hidden"));
        assert!(!validate_package_name("bad/name"));
    }
}
