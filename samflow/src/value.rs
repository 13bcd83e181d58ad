//! Optional-field values: the closed set of types a `TAG:TYPE:VALUE` alignment
//! field or header record value can hold.
//!
//! Grounded on `sam_types.cpp`'s `optional_field_parse_table`/`optional_field_output_table`.
//! The original uses `std::any` keyed by `std::type_index` to dispatch parse/format;
//! a closed Rust enum expresses the same twelve-case table without the runtime
//! type lookup.

use std::fmt;

use crate::{
    error::{Error, ParseError, Result},
    scanner::Scanner,
    slice::Slice,
};

/// The value carried by one optional field (`TAG:TYPE:VALUE`).
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// `A`: a single printable character.
    Char(char),
    /// `i`: a signed 32-bit integer.
    Int(i32),
    /// `f`: a 32-bit float.
    Float(f32),
    /// `Z`: a printable string.
    Str(Slice),
    /// `H`: a byte array, formatted as hex pairs.
    Hex(Vec<u8>),
    /// `B:c`: signed 8-bit integer array.
    Int8Array(Vec<i8>),
    /// `B:C`: unsigned 8-bit integer array.
    UInt8Array(Vec<u8>),
    /// `B:s`: signed 16-bit integer array.
    Int16Array(Vec<i16>),
    /// `B:S`: unsigned 16-bit integer array.
    UInt16Array(Vec<u16>),
    /// `B:i`: signed 32-bit integer array.
    Int32Array(Vec<i32>),
    /// `B:I`: unsigned 32-bit integer array.
    UInt32Array(Vec<u32>),
    /// `B:f`: float array.
    FloatArray(Vec<f32>),
}

impl Value {
    /// The one-byte type code this value formats under.
    pub fn type_code(&self) -> char {
        match self {
            Value::Char(_) => 'A',
            Value::Int(_) => 'i',
            Value::Float(_) => 'f',
            Value::Str(_) => 'Z',
            Value::Hex(_) => 'H',
            Value::Int8Array(_)
            | Value::UInt8Array(_)
            | Value::Int16Array(_)
            | Value::UInt16Array(_)
            | Value::Int32Array(_)
            | Value::UInt32Array(_)
            | Value::FloatArray(_) => 'B',
        }
    }

    /// Parses a value of kind `typebyte` from `sc`, consuming up to the next tab.
    pub fn parse(typebyte: char, sc: &mut Scanner) -> Result<Value> {
        match typebyte {
            'A' => {
                let (c, _) = sc.read_char_until('\t')?;
                Ok(Value::Char(c))
            }
            'i' => Ok(Value::Int(sc.do_int()?)),
            'f' => {
                let slice = sc.do_string()?;
                Ok(Value::Float(crate::scanner::parse_f32(slice.as_str())?))
            }
            'Z' => Ok(Value::Str(sc.do_string()?)),
            'H' => Ok(Value::Hex(parse_hex_bytes(sc.do_string()?.as_str())?)),
            'B' => parse_numeric_array(sc),
            other => Err(Error::Parse(ParseError::UnknownFieldType(other))),
        }
    }
}

fn parse_hex_bytes(s: &str) -> Result<Vec<u8>> {
    let bytes = s.as_bytes();
    if bytes.len() % 2 != 0 {
        return Err(Error::Parse(ParseError::InvalidFieldType));
    }
    let mut result = Vec::with_capacity(bytes.len() / 2);
    for chunk in bytes.chunks(2) {
        let byte = std::str::from_utf8(chunk)
            .ok()
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .ok_or(Error::Parse(ParseError::InvalidFieldType))?;
        result.push(byte);
    }
    Ok(result)
}

fn parse_numeric_array(sc: &mut Scanner) -> Result<Value> {
    let (ntype, found_comma) = sc.read_char_until(',')?;
    if !found_comma {
        return Err(Error::Parse(ParseError::MissingNumericArrayType));
    }

    macro_rules! collect {
        ($parse:expr) => {{
            let mut result = Vec::with_capacity(8);
            loop {
                let (elem, delim) = sc.read_until_either(',', '\t');
                result.push($parse(elem.as_str())?);
                if delim != Some(',') {
                    break;
                }
            }
            result
        }};
    }

    match ntype {
        'c' => Ok(Value::Int8Array(
            collect!(|s: &str| crate::scanner::parse_i32(s).map(|v| v as i8)),
        )),
        'C' => Ok(Value::UInt8Array(
            collect!(|s: &str| crate::scanner::parse_i32(s).map(|v| v as u8)),
        )),
        's' => Ok(Value::Int16Array(
            collect!(|s: &str| crate::scanner::parse_i32(s).map(|v| v as i16)),
        )),
        'S' => Ok(Value::UInt16Array(
            collect!(|s: &str| crate::scanner::parse_i32(s).map(|v| v as u16)),
        )),
        'i' => Ok(Value::Int32Array(collect!(crate::scanner::parse_i32))),
        'I' => Ok(Value::UInt32Array(
            collect!(|s: &str| crate::scanner::parse_i32(s).map(|v| v as u32)),
        )),
        'f' => Ok(Value::FloatArray(collect!(crate::scanner::parse_f32))),
        other => Err(Error::Parse(ParseError::InvalidNumericArrayType(other))),
    }
}
