use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time to wait for a response.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Where a request handler sends its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseRouting {
    /// Back to the scope the request came from.
    Origin,
    /// To both the local and the remote scope, whoever waits picks it up.
    Broadcast,
}

/// What happens when a second handler is registered for a command or request.
///
/// Notifications always accept any number of subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Fail the registration.
    Reject,
    /// The new handler replaces the previous one.
    Replace,
    /// Every handler runs. Requests then answer once per handler and the
    /// caller keeps the first response.
    Append,
}

/// How notifications published to the local scope reach local subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalDelivery {
    /// Through the transport's local scope.
    Loopback,
    /// Dispatched in-process, `publish` returns once every subscriber ran.
    Direct,
}

/// Configuration of a [Mediator](crate::Mediator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediatorOptions {
    /// Timeout used by `request`, zero waits forever.
    #[serde(rename = "default_timeout_ms", with = "millis")]
    pub default_timeout: Duration,
    pub response_routing: ResponseRouting,
    pub duplicate_handlers: DuplicatePolicy,
    pub local_delivery: LocalDelivery,
}

impl Default for MediatorOptions {
    fn default() -> Self {
        MediatorOptions {
            default_timeout: DEFAULT_TIMEOUT,
            response_routing: ResponseRouting::Origin,
            duplicate_handlers: DuplicatePolicy::Reject,
            local_delivery: LocalDelivery::Loopback,
        }
    }
}

mod millis {
    use serde::ser::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(duration.as_millis()).map_err(|_| {
            S::Error::custom(format!("{:?} does not fit in u64 milliseconds", duration))
        })?;
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
