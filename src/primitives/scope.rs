//! Defines the closed scope vocabulary and the set type used in grants.
use std::{fmt, str};

use std::collections::BTreeSet;
use std::iter::FromIterator;
use serde::{Deserialize, Serialize};

/// A single permission gating one category of gateway operations.
///
/// The vocabulary is closed: the wire strings below are the shared contract
/// with the route handlers and anything else is rejected while parsing. Each
/// scope names a resource and an action on it, separated by a colon.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Scope {
    /// `device-identifier:retrieve-identifier`, read the full device identifier.
    RetrieveIdentifier,

    /// `device-identifier:retrieve-type`, read the device model information.
    RetrieveType,

    /// `device-identifier:retrieve-ppid`, read the pseudonymous per-client identifier.
    RetrievePpid,

    /// `location-retrieval:read`, retrieve the last known device location.
    LocationRead,

    /// `location-verification:verify`, verify a claimed device location.
    LocationVerify,
}

/// Scope of a given grant or resource, an unordered set of scopes.
///
/// A set is fulfilled if all of its members are fulfilled, which induces the
/// usual subset relation. Requested scopes are granted iff they form a subset
/// of the scopes registered for the client, and an empty request is trivially
/// granted.
///
/// The string representation is the RFC 6749 one, members separated by
/// spaces:
///
/// ```
/// # use camara_auth::primitives::scope::{Scope, ScopeSet};
/// let granted: ScopeSet = "location-retrieval:read location-verification:verify"
///     .parse().unwrap();
///
/// assert!(granted.contains(Scope::LocationRead));
/// assert!(!granted.contains(Scope::RetrievePpid));
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ScopeSet {
    members: BTreeSet<Scope>,
}

/// Error returned from parsing a scope string.
///
/// The vocabulary is closed, so next to character level errors this also
/// covers well-formed scope tokens that simply do not exist for this gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownScope(String);

impl Scope {
    /// The wire representation of this scope.
    ///
    /// This is the single source of truth for the strings, `FromStr` is its
    /// exact inverse.
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::RetrieveIdentifier => "device-identifier:retrieve-identifier",
            Scope::RetrieveType => "device-identifier:retrieve-type",
            Scope::RetrievePpid => "device-identifier:retrieve-ppid",
            Scope::LocationRead => "location-retrieval:read",
            Scope::LocationVerify => "location-verification:verify",
        }
    }
}

impl ScopeSet {
    /// Create an empty set, granting nothing.
    pub fn new() -> ScopeSet {
        ScopeSet::default()
    }

    /// Add a scope to the set.
    pub fn insert(&mut self, scope: Scope) {
        self.members.insert(scope);
    }

    /// Determine if the scope is a member of this set.
    pub fn contains(&self, scope: Scope) -> bool {
        self.members.contains(&scope)
    }

    /// Determine if every member of this set is also a member of `rhs`.
    ///
    /// The empty set is a subset of everything, so an empty scope request
    /// validates against any client.
    pub fn is_subset(&self, rhs: &ScopeSet) -> bool {
        self.members.is_subset(&rhs.members)
    }

    /// Whether the set grants nothing at all.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Number of scopes in the set.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Create an iterator over the individual scopes.
    pub fn iter(&self) -> impl Iterator<Item = Scope> + '_ {
        self.members.iter().copied()
    }
}

impl str::FromStr for Scope {
    type Err = UnknownScope;

    fn from_str(string: &str) -> Result<Scope, UnknownScope> {
        match string {
            "device-identifier:retrieve-identifier" => Ok(Scope::RetrieveIdentifier),
            "device-identifier:retrieve-type" => Ok(Scope::RetrieveType),
            "device-identifier:retrieve-ppid" => Ok(Scope::RetrievePpid),
            "location-retrieval:read" => Ok(Scope::LocationRead),
            "location-verification:verify" => Ok(Scope::LocationVerify),
            _ => Err(UnknownScope(string.to_string())),
        }
    }
}

impl str::FromStr for ScopeSet {
    type Err = UnknownScope;

    fn from_str(string: &str) -> Result<ScopeSet, UnknownScope> {
        string
            .split(' ')
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl FromIterator<Scope> for ScopeSet {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = Scope>,
    {
        ScopeSet {
            members: iter.into_iter().collect(),
        }
    }
}

impl From<Scope> for ScopeSet {
    fn from(scope: Scope) -> ScopeSet {
        std::iter::once(scope).collect()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

impl fmt::Display for UnknownScope {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "Not a scope known to this server: {}", self.0)
    }
}

impl fmt::Debug for ScopeSet {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_tuple("ScopeSet").field(&self.members).finish()
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let output = self
            .members
            .iter()
            .map(|member| member.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        fmt.write_str(&output)
    }
}

impl Serialize for Scope {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Scope {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let string = String::deserialize(deserializer)?;
        string.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for ScopeSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ScopeSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let string = String::deserialize(deserializer)?;
        string.parse().map_err(serde::de::Error::custom)
    }
}
