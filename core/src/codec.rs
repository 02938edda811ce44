//! Text form of a gas source, used when handing gases between screens and
//! front-ends.
//!
//! ```text
//! mix:32/0            EAN32 (percent O2 / percent He)
//! mix:18.5/45         trimix
//! setpoint:13         1.3 bar, no diluent (pO2 x 10)
//! setpoint:13/10/70   1.3 bar on a 10/70 diluent
//! any                 no preference
//! ```

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::char,
    combinator::{all_consuming, map, map_res, opt, value},
    number::complete::recognize_float,
    sequence::{preceded, separated_pair},
    IResult, Parser,
};

use crate::error::PlanError;
use crate::gas::{GasSource, Mix, Setpoint};

/// A decoded wire value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WireGas {
    /// The caller accepts any gas source.
    Any,
    Source(GasSource),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Parsed {
    Any,
    Mix(f64, f64),
    Setpoint(f64, Option<(f64, f64)>),
}

/// Encode `gas` in its text form.
pub fn encode(gas: &GasSource) -> Result<String, PlanError> {
    match gas {
        GasSource::Mix(mix) => Ok(format!("mix:{}", encode_fractions(mix)?)),
        GasSource::Setpoint(sp) => {
            let po2 = shortest(sp.po2_setting(), 10.0);
            match sp.diluent() {
                Some(diluent) => Ok(format!("setpoint:{po2}/{}", encode_fractions(&diluent)?)),
                None => Ok(format!("setpoint:{po2}")),
            }
        }
    }
}

/// Encode an optional gas; `None` is `any`.
pub fn encode_wire(gas: Option<&GasSource>) -> Result<String, PlanError> {
    match gas {
        Some(gas) => encode(gas),
        None => Ok("any".to_string()),
    }
}

/// Decode the text form. Anything malformed or physically invalid is `None`.
pub fn decode(input: &str) -> Option<WireGas> {
    let (_, parsed) = all_consuming(parse_wire).parse(input.trim()).ok()?;
    match parsed {
        Parsed::Any => Some(WireGas::Any),
        Parsed::Mix(o2, he) => Some(WireGas::Source(percent_mix(o2, he)?.into())),
        Parsed::Setpoint(po2, diluent) => {
            let diluent = match diluent {
                Some((o2, he)) => Some(percent_mix(o2, he)?),
                None => None,
            };
            let sp = Setpoint::new(po2 / 10.0, diluent).ok()?;
            Some(WireGas::Source(sp.into()))
        }
    }
}

fn encode_fractions(mix: &Mix) -> Result<String, PlanError> {
    let o2 = shortest(mix.o2(), 100.0);
    let he = shortest(mix.he(), 100.0);
    if o2 + he > 100.0 + 1e-6 {
        return Err(PlanError::InvalidGasComposition {
            o2: mix.o2(),
            he: mix.he(),
        });
    }
    Ok(format!("{o2}/{he}"))
}

/// `value * scale` for printing.
///
/// Float noise (`7.000000000000001`) is rounded off only when the rounded
/// figure still decodes to exactly `value`; otherwise the full figure is kept.
fn shortest(value: f64, scale: f64) -> f64 {
    let scaled = value * scale;
    let rounded = (scaled * 1000.0).round() / 1000.0;
    let printed = if rounded / scale == value { rounded } else { scaled };
    // no "-0"
    printed + 0.0
}

fn percent_mix(o2: f64, he: f64) -> Option<Mix> {
    Mix::new(o2 / 100.0, he / 100.0).ok()
}

fn number(input: &str) -> IResult<&str, f64> {
    map_res(recognize_float, |s: &str| s.parse::<f64>()).parse(input)
}

fn fractions(input: &str) -> IResult<&str, (f64, f64)> {
    separated_pair(number, char('/'), number).parse(input)
}

fn parse_mix(input: &str) -> IResult<&str, Parsed> {
    map(preceded(tag("mix:"), fractions), |(o2, he)| Parsed::Mix(o2, he)).parse(input)
}

fn parse_setpoint(input: &str) -> IResult<&str, Parsed> {
    map(
        preceded(
            tag("setpoint:"),
            (number, opt(preceded(char('/'), fractions))),
        ),
        |(po2, diluent)| Parsed::Setpoint(po2, diluent),
    )
    .parse(input)
}

fn parse_wire(input: &str) -> IResult<&str, Parsed> {
    alt((value(Parsed::Any, tag("any")), parse_mix, parse_setpoint)).parse(input)
}
