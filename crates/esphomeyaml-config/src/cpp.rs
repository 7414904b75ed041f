//! C++ types shared by several components.

use esphomeyaml_codegen::{ClassRef, Expression, Namespace};

/// `using namespace esphomelib;` is part of the generated prelude, so the
/// library namespace renders as the global one.
#[must_use]
pub fn esphomelib_ns() -> Namespace {
    Namespace::root("")
}

/// The `App` singleton.
#[must_use]
pub fn app() -> Expression {
    Expression::global("App")
}

/// `Application`.
#[must_use]
pub fn application() -> ClassRef {
    esphomelib_ns().struct_("Application")
}

/// `NoArg`, the argument type of triggers without payload.
#[must_use]
pub fn no_arg() -> ClassRef {
    esphomelib_ns().struct_("NoArg")
}

/// `Component`.
#[must_use]
pub fn component() -> ClassRef {
    esphomelib_ns().struct_("Component")
}

/// `PollingComponent`.
#[must_use]
pub fn polling_component() -> ClassRef {
    esphomelib_ns().class("PollingComponent", &[&component()])
}

/// `Nameable`.
#[must_use]
pub fn nameable() -> ClassRef {
    esphomelib_ns().struct_("Nameable")
}

/// `Trigger`.
#[must_use]
pub fn trigger() -> ClassRef {
    esphomelib_ns().struct_("Trigger")
}

/// `Action`.
#[must_use]
pub fn action() -> ClassRef {
    esphomelib_ns().struct_("Action")
}

/// `Condition`.
#[must_use]
pub fn condition() -> ClassRef {
    esphomelib_ns().struct_("Condition")
}

/// `Automation`.
#[must_use]
pub fn automation() -> ClassRef {
    esphomelib_ns().struct_("Automation")
}

/// `mqtt::MQTTComponent`.
#[must_use]
pub fn mqtt_component() -> ClassRef {
    esphomelib_ns()
        .namespace("mqtt")
        .class("MQTTComponent", &[&component()])
}

/// `GPIOPin`.
#[must_use]
pub fn gpio_pin() -> ClassRef {
    esphomelib_ns().struct_("GPIOPin")
}

/// `GPIOInputPin`.
#[must_use]
pub fn gpio_input_pin() -> ClassRef {
    esphomelib_ns().class("GPIOInputPin", &[&gpio_pin()])
}

/// `GPIOOutputPin`.
#[must_use]
pub fn gpio_output_pin() -> ClassRef {
    esphomelib_ns().class("GPIOOutputPin", &[&gpio_pin()])
}

/// `const char *`, e.g. the shutdown reason.
#[must_use]
pub fn const_char_ptr() -> ClassRef {
    ClassRef::new("const char").pointer()
}
