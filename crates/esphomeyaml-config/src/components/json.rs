//! JSON support library used by MQTT and web components.

use crate::component::Component;
use crate::cv::{self, Schema, Validator};

fn config_schema() -> Validator {
    cv::nullable(Schema::new().into())
}

/// Descriptor of `json:`.
#[must_use]
pub fn component() -> Component {
    Component::new("json")
        .schema(config_schema)
        .build_flags(&["-DUSE_JSON"])
        .libraries(&["ArduinoJson@5.13.3"])
}
