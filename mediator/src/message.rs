use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Cow;

/// A value that can travel as a payload.
pub trait Payload: Serialize + DeserializeOwned + Send + 'static {}

impl<T> Payload for T where T: Serialize + DeserializeOwned + Send + 'static {}

/// A message with a stable wire event name.
///
/// Both sides derive the event name from the type alone, so a type must
/// resolve to the same name in every process that uses it.
pub trait Message: Payload {
    /// Returns the wire event name of this message type.
    ///
    /// Defaults to the type name without its module path or generic arguments.
    fn event_name() -> Cow<'static, str> {
        Cow::Borrowed(short_type_name::<Self>())
    }
}

/// Returns the unqualified name of `T`, `my_app::msg::Ping<u32>` becomes `Ping`.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = match full.find('<') {
        Some(index) => &full[..index],
        None => full,
    };

    match base.rfind("::") {
        Some(index) => &base[index + 2..],
        None => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    mod nested {
        use serde::{Deserialize, Serialize};

        #[derive(Serialize, Deserialize)]
        pub struct Wrapped<T>(pub T);
    }

    #[derive(Serialize, Deserialize)]
    struct Ping;
    impl Message for Ping {}

    #[derive(Serialize, Deserialize)]
    struct Renamed;
    impl Message for Renamed {
        fn event_name() -> Cow<'static, str> {
            Cow::Borrowed("custom:renamed")
        }
    }

    #[test]
    fn short_type_name_test() {
        assert_eq!("Ping", short_type_name::<Ping>());
        assert_eq!("Wrapped", short_type_name::<nested::Wrapped<Ping>>());
        assert_eq!("u32", short_type_name::<u32>());
    }

    #[test]
    fn event_name_test() {
        assert_eq!("Ping", Ping::event_name());
        assert_eq!("custom:renamed", Renamed::event_name());
    }
}
