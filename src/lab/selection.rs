//! Arguments that accept either a raw JSON mapping or a builder object.

use serde_json::{Map, Value};

/// Anything that can produce a selection or filter mapping.
///
/// Raw [`Value`]s and [`Map`]s are used as-is; external builders only need
/// to provide [`BuildSettings::build`].
pub trait BuildSettings {
    /// Produce the mapping written into the task settings.
    fn build(&self) -> Value;
}

impl BuildSettings for Value {
    fn build(&self) -> Value {
        self.clone()
    }
}

impl BuildSettings for Map<String, Value> {
    fn build(&self) -> Value {
        Value::Object(self.clone())
    }
}

impl<T: BuildSettings + ?Sized> BuildSettings for &T {
    fn build(&self) -> Value {
        (**self).build()
    }
}

impl<T: BuildSettings + ?Sized> BuildSettings for Box<T> {
    fn build(&self) -> Value {
        (**self).build()
    }
}
