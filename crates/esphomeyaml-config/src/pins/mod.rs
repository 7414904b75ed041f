//! GPIO pin validation and pin object code generation.
//!
//! Pin names (`D3`, `SDA`, `GPIO5`) resolve against the board table of the
//! active platform and then the platform's base table. Full pin schemas
//! carry `mode` and `inverted`; a mapping containing a registered expander
//! key (such as `pcf8574`) is validated and built by that expander instead.

use esphomeyaml_codegen::{CodegenContext, Expression, Halt};
use tracing::warn;

use crate::cpp;
use crate::cv::{self, EspPlatform, Schema, ValidateContext, Validator};
use crate::error::Invalid;
use crate::node::{Node, Value};
use crate::registry::{BuildEnv, PinDirection, PinEntry, Registries};

mod boards;

use boards::{
    BoardPins, ESP32_BASE_PINS, ESP32_BOARD_PINS, ESP8266_BASE_PINS, ESP8266_BOARD_PINS,
};

const MODES_ESP8266: &[&str] = &[
    "INPUT",
    "OUTPUT",
    "INPUT_PULLUP",
    "OUTPUT_OPEN_DRAIN",
    "SPECIAL",
    "FUNCTION_1",
    "FUNCTION_2",
    "FUNCTION_3",
    "FUNCTION_4",
    "FUNCTION_0",
    "WAKEUP_PULLUP",
    "WAKEUP_PULLDOWN",
    "INPUT_PULLDOWN_16",
];

const MODES_ESP32: &[&str] = &[
    "INPUT",
    "OUTPUT",
    "INPUT_PULLUP",
    "OUTPUT_OPEN_DRAIN",
    "SPECIAL",
    "FUNCTION_1",
    "FUNCTION_2",
    "FUNCTION_3",
    "FUNCTION_4",
    "PULLUP",
    "PULLDOWN",
    "INPUT_PULLDOWN",
    "OPEN_DRAIN",
    "FUNCTION_5",
    "FUNCTION_6",
    "ANALOG",
];

fn tables(
    platform: EspPlatform,
) -> (&'static [(&'static str, BoardPins)], &'static [(&'static str, u8)]) {
    match platform {
        EspPlatform::Esp8266 => (ESP8266_BOARD_PINS, ESP8266_BASE_PINS),
        EspPlatform::Esp32 => (ESP32_BOARD_PINS, ESP32_BASE_PINS),
    }
}

/// Boards known for `platform`, in table order.
pub fn board_names(platform: EspPlatform) -> impl Iterator<Item = &'static str> {
    tables(platform).0.iter().map(|(name, _)| *name)
}

/// Whether `board` is in the board table of `platform`.
#[must_use]
pub fn is_known_board(platform: EspPlatform, board: &str) -> bool {
    board_names(platform).any(|name| name == board)
}

/// Internal pin number of a named pin on `board`.
pub fn lookup_pin(platform: EspPlatform, board: &str, name: &str) -> Result<u8, String> {
    let (boards, base) = tables(platform);
    let mut board = board;
    // Bounded in case of alias loops.
    for _ in 0..4 {
        match boards.iter().find(|(candidate, _)| *candidate == board) {
            Some((_, BoardPins::Alias(target))) => board = target,
            Some((_, BoardPins::Pins(pins))) => {
                if let Some((_, number)) = pins.iter().find(|(pin, _)| *pin == name) {
                    return Ok(*number);
                }
                break;
            }
            None => break,
        }
    }
    base.iter()
        .find(|(pin, _)| *pin == name)
        .map(|(_, number)| *number)
        .ok_or_else(|| format!("Can't find internal pin number for {name}."))
}

fn translate_pin(node: &Node, ctx: &ValidateContext) -> Result<i64, String> {
    match &node.value {
        Value::Map(_) | Value::Null => Err(
            "This variable only supports pin numbers, not full pin schemas (with inverted and mode)."
                .to_string(),
        ),
        Value::Int(number) => Ok(*number),
        Value::Str(text) => {
            if let Ok(number) = text.trim().parse::<i64>() {
                return Ok(number);
            }
            if let Some(rest) = text.strip_prefix("GPIO") {
                return rest
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| format!("invalid pin number: {text}"));
            }
            lookup_pin(ctx.platform, &ctx.board, text).map(i64::from)
        }
        _ => Err(format!("invalid pin number: {node}")),
    }
}

fn validate_gpio_pin(node: &Node, ctx: &ValidateContext) -> Result<i64, String> {
    let number = translate_pin(node, ctx)?;
    match ctx.platform {
        EspPlatform::Esp32 => {
            if !(0..=39).contains(&number) {
                return Err(format!("ESP32: Invalid pin number: {number}"));
            }
            if (6..=11).contains(&number) {
                warn!(
                    "ESP32: Pin {number} (6-11) might already be used by the flash interface. Be warned."
                );
            }
            if matches!(number, 20 | 24 | 28..=31) {
                warn!("ESP32: Pin {number} (20, 24, 28-31) can usually not be used. Be warned.");
            }
        }
        EspPlatform::Esp8266 => {
            if (6..=11).contains(&number) {
                warn!(
                    "ESP8266: Pin {number} (6-11) might already be used by the flash interface. Be warned."
                );
            }
            if !(0..=17).contains(&number) {
                return Err(format!("ESP8266: Invalid pin number: {number}"));
            }
        }
    }
    Ok(number)
}

fn pin_validator(
    check: impl Fn(i64, EspPlatform) -> Result<(), String> + Send + Sync + 'static,
) -> Validator {
    Validator::new(move |node, ctx| {
        let number = validate_gpio_pin(node, ctx).map_err(|message| Invalid::at(node, message))?;
        check(number, ctx.platform).map_err(|message| Invalid::at(node, message))?;
        Ok(node.with_value(Value::Int(number)))
    })
}

/// Any pin usable for digital input.
#[must_use]
pub fn input_pin() -> Validator {
    pin_validator(|_, _| Ok(()))
}

/// Any pin usable for digital output.
#[must_use]
pub fn output_pin() -> Validator {
    pin_validator(|number, platform| {
        if platform == EspPlatform::Esp32 && (34..=39).contains(&number) {
            return Err(format!("ESP32: Pin {number} (34-39) can only be used as input pins."));
        }
        Ok(())
    })
}

/// Pin usable in both directions.
#[must_use]
pub fn input_output_pin() -> Validator {
    input_pin().then(output_pin())
}

/// Pin connected to the ADC.
#[must_use]
pub fn analog_pin() -> Validator {
    pin_validator(|number, platform| match platform {
        EspPlatform::Esp32 if (32..=39).contains(&number) => Ok(()),
        EspPlatform::Esp32 => Err("ESP32: Only pins 32 though 39 support ADC.".to_string()),
        EspPlatform::Esp8266 if number == 17 => Ok(()),
        EspPlatform::Esp8266 => Err("ESP8266: Only pin A0 (17) supports ADC.".to_string()),
    })
}

/// Pin mode name of the active platform, upper-cased.
#[must_use]
pub fn pin_mode() -> Validator {
    let esp8266 = cv::one_of_upper(MODES_ESP8266);
    let esp32 = cv::one_of_upper(MODES_ESP32);
    Validator::new(move |node, ctx| match ctx.platform {
        EspPlatform::Esp8266 => esp8266.validate(node, ctx),
        EspPlatform::Esp32 => esp32.validate(node, ctx),
    })
}

fn full_schema(number: Validator) -> Validator {
    Schema::new()
        .required("number", number)
        .optional("mode", pin_mode())
        .optional("inverted", cv::boolean())
        .into()
}

fn shorthand(number: Validator) -> Validator {
    Validator::new(move |node, ctx| {
        let number = number.validate(node, ctx)?;
        Ok(node.with_value(Value::Map(
            [("number".into(), number)].into_iter().collect(),
        )))
    })
}

fn internal_schema(number: Validator) -> Validator {
    let full = full_schema(number.clone());
    let short = shorthand(number);
    Validator::new(move |node, ctx| {
        if node.as_map().is_some() {
            full.validate(node, ctx)
        } else {
            short.validate(node, ctx)
        }
    })
}

fn expander<'a>(node: &Node, registries: &'a Registries) -> Option<&'a PinEntry> {
    node.as_map()?
        .keys()
        .find_map(|key| registries.pins.get(key))
}

fn expandable_schema(number: Validator, direction: PinDirection) -> Validator {
    let internal = internal_schema(number);
    Validator::new(move |node, ctx| match expander(node, &ctx.registries) {
        Some(entry) => match direction {
            PinDirection::Input => entry.input_schema.validate(node, ctx),
            PinDirection::Output => entry.output_schema.validate(node, ctx),
        },
        None => internal.validate(node, ctx),
    })
}

/// Output pin on the chip itself: a number/name or `{number, mode, inverted}`.
#[must_use]
pub fn internal_gpio_output_pin_schema() -> Validator {
    internal_schema(output_pin())
}

/// Input pin on the chip itself.
#[must_use]
pub fn internal_gpio_input_pin_schema() -> Validator {
    internal_schema(input_pin())
}

/// Output pin on the chip or on a registered expander.
#[must_use]
pub fn gpio_output_pin_schema() -> Validator {
    expandable_schema(output_pin(), PinDirection::Output)
}

/// Input pin on the chip or on a registered expander.
#[must_use]
pub fn gpio_input_pin_schema() -> Validator {
    expandable_schema(input_pin(), PinDirection::Input)
}

fn pin_expression(
    conf: &Node,
    direction: PinDirection,
    env: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    if let Some(entry) = expander(conf, &env.registries) {
        return (entry.build)(conf, direction, env, ctx);
    }
    let number = conf.get_i64("number").unwrap_or_default();
    let (class, default_mode) = match direction {
        PinDirection::Input => (cpp::gpio_input_pin(), "INPUT"),
        PinDirection::Output => (cpp::gpio_output_pin(), "OUTPUT"),
    };
    let mode = conf.get_str("mode").unwrap_or(default_mode);
    let inverted = conf.get_bool("inverted").unwrap_or(false);
    Ok(Expression::raw(class.path()).call(vec![
        number.into(),
        Expression::raw(mode),
        inverted.into(),
    ]))
}

/// `GPIOOutputPin(number, MODE, inverted)` or the expander's pin.
pub fn gpio_output_pin_expression(
    conf: &Node,
    env: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    pin_expression(conf, PinDirection::Output, env, ctx)
}

/// `GPIOInputPin(number, MODE, inverted)` or the expander's pin.
pub fn gpio_input_pin_expression(
    conf: &Node,
    env: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    pin_expression(conf, PinDirection::Input, env, ctx)
}
