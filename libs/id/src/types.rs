//! Concrete id types.

use ulid::Ulid;

use crate::define_opaque_id;
use crate::error::IdError;

define_opaque_id!(OfferId, "offer id");
define_opaque_id!(AgentId, "agent id");
define_opaque_id!(FrameworkId, "framework id");

/// A user-chosen application id.
///
/// App ids name a declarative app definition and are embedded into every
/// task id launched for that app. The character set is restricted to
/// lowercase letters, digits and `-` so the `.` separator in task ids stays
/// unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AppId(String);

impl AppId {
    /// Parses and validates an app id.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(IdError::InvalidAppId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Returns the raw app id value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AppId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AppId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for AppId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for AppId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A framework-wide unique task id.
///
/// Format: `{app_id}.{ulid}`. The app portion makes owner derivation a pure
/// string operation; the ULID portion orders tasks of one app by creation
/// time and carries 80 bits of randomness for uniqueness.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId {
    app: AppId,
    suffix: Ulid,
}

impl TaskId {
    /// Mints a fresh task id for an app.
    #[must_use]
    pub fn for_app(app: &AppId) -> Self {
        Self {
            app: app.clone(),
            suffix: Ulid::new(),
        }
    }

    /// Parses a task id from its canonical `{app_id}.{ulid}` form.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        let Some((app, suffix)) = s.rsplit_once('.') else {
            return Err(IdError::MissingSeparator);
        };
        let app = AppId::parse(app)?;
        let suffix = suffix
            .parse::<Ulid>()
            .map_err(|e| IdError::InvalidUlid(e.to_string()))?;
        Ok(Self { app, suffix })
    }

    /// Returns the owning app id.
    #[must_use]
    pub fn app_id(&self) -> &AppId {
        &self.app
    }

    /// Returns the ULID suffix.
    #[must_use]
    pub const fn suffix(&self) -> Ulid {
        self.suffix
    }

    /// Returns the creation timestamp embedded in the suffix, in
    /// milliseconds since the epoch.
    #[must_use]
    pub fn timestamp_ms(&self) -> u64 {
        self.suffix.timestamp_ms()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.app, self.suffix)
    }
}

impl std::str::FromStr for TaskId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for TaskId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for TaskId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
