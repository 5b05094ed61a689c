//! Attribute tokens attached to declarations by the header extractor.
//!
//! Each declaration kind has its own closed set. Tokens nobody recognises
//! become `Unrecognized` and are warned about, never silently dropped.

use std::str::FromStr;

/// Function attribute (`/S`, `/C`, `/V`, `/PV`, `=name`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FuncAttr {
    Static,
    Const,
    Virtual,
    PureVirtual,
    /// `=name`: bind the overload set under another name.
    Rename(String),
    Unrecognized(String),
}

impl FromStr for FuncAttr {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "/S" => FuncAttr::Static,
            "/C" => FuncAttr::Const,
            "/V" => FuncAttr::Virtual,
            "/PV" => FuncAttr::PureVirtual,
            _ => match s.strip_prefix('=') {
                Some(name) if !name.is_empty() => FuncAttr::Rename(name.to_string()),
                _ => FuncAttr::Unrecognized(s.to_string()),
            },
        })
    }
}

/// Argument attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgAttr {
    /// `/O`: written by the callee only.
    Output,
    /// `/IO`: read and written.
    InOut,
    /// `/C`: const-qualified; nothing to do.
    Const,
    /// `/Ref`: lvalue reference; nothing to do.
    Ref,
    /// `/A n`: C array whose length is passed in `n`.
    Array(String),
    /// `/CA x`: C array converted through `x`.
    ArrayConvert(String),
    /// `/RRef`
    RvalueRef,
    Unrecognized(String),
}

impl FromStr for ArgAttr {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "/O" => ArgAttr::Output,
            "/IO" => ArgAttr::InOut,
            "/C" => ArgAttr::Const,
            "/Ref" => ArgAttr::Ref,
            "/RRef" => ArgAttr::RvalueRef,
            _ => {
                // "/CA" must be tried before "/A".
                if let Some(rest) = s.strip_prefix("/CA") {
                    ArgAttr::ArrayConvert(rest.trim().to_string())
                } else if let Some(rest) = s.strip_prefix("/A") {
                    ArgAttr::Array(rest.trim().to_string())
                } else {
                    ArgAttr::Unrecognized(s.to_string())
                }
            }
        })
    }
}

/// Class attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassAttr {
    Simple,
    Map,
    Rename(String),
    Unrecognized(String),
}

impl FromStr for ClassAttr {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "/Simple" => ClassAttr::Simple,
            "/Map" => ClassAttr::Map,
            _ => match s.strip_prefix('=') {
                Some(name) if !name.is_empty() => ClassAttr::Rename(name.to_string()),
                _ => ClassAttr::Unrecognized(s.to_string()),
            },
        })
    }
}

/// Field attribute. Only `/RW` carries meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropAttr {
    ReadWrite,
    Unrecognized(String),
}

impl FromStr for PropAttr {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "/RW" => PropAttr::ReadWrite,
            _ => PropAttr::Unrecognized(s.to_string()),
        })
    }
}

/// Parse every token of an attribute list.
pub fn parse_all<T: FromStr<Err = std::convert::Infallible>>(tokens: &[String]) -> Vec<T> {
    tokens
        .iter()
        .map(|t| match t.parse() {
            Ok(attr) => attr,
            Err(never) => match never {},
        })
        .collect()
}
