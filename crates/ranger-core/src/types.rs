//! Logical type system.
//!
//! Ranger recognizes a fixed set of primitive types plus three composite
//! constructors (`list<T>`, `map<K,V>`, `struct<name:T, …>`). Types render
//! to a canonical lowercase string and parse back losslessly; the parser is
//! a small recursive descent over that grammar.

use std::fmt;

use crate::codes;
use crate::error::RangerError;
use crate::Result;

/// A logical column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    Boolean,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal { precision: u32, scale: u32 },
    String,
    Binary,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Uuid,
    List(Box<DataType>),
    Map(Box<DataType>, Box<DataType>),
    Struct(Vec<StructField>),
}

/// A named field of a struct type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructField {
    pub name: String,
    pub data_type: DataType,
}

impl DataType {
    /// Parse a canonical type string, e.g. `decimal(10,2)` or
    /// `map<string,list<int64>>`.
    pub fn parse(input: &str) -> Result<Self> {
        let mut parser = TypeParser::new(input);
        let ty = parser.parse_type()?;
        parser.skip_ws();
        if !parser.at_end() {
            return Err(RangerError::new(
                codes::TYPES_UNSUPPORTED_TYPE,
                format!("trailing input in type string: {input:?}"),
            ));
        }
        ty.validate()?;
        Ok(ty)
    }

    /// Validate structural rules: decimal precision/scale bounds, unique
    /// non-empty struct field names, recursively.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Decimal { precision, scale } => {
                if *precision == 0 {
                    return Err(RangerError::new(
                        codes::TYPES_INVALID_DECIMAL_PRECISION,
                        format!("decimal precision must be positive, got {precision}"),
                    ));
                }
                if scale > precision {
                    return Err(RangerError::new(
                        codes::TYPES_DECIMAL_SCALE_EXCEEDS_PRECISION,
                        format!("decimal scale {scale} exceeds precision {precision}"),
                    ));
                }
                Ok(())
            }
            Self::List(elem) => elem.validate().map_err(|e| {
                RangerError::new(codes::TYPES_INVALID_LIST_ELEMENT, e.message().to_string())
            }),
            Self::Map(key, value) => {
                key.validate().map_err(|e| {
                    RangerError::new(codes::TYPES_INVALID_MAP_KEY_TYPE, e.message().to_string())
                })?;
                value.validate().map_err(|e| {
                    RangerError::new(codes::TYPES_INVALID_MAP_VALUE_TYPE, e.message().to_string())
                })
            }
            Self::Struct(fields) => {
                let mut seen = std::collections::HashSet::new();
                for field in fields {
                    if field.name.is_empty() {
                        return Err(RangerError::new(
                            codes::TYPES_INVALID_STRUCT_FIELD,
                            "struct field name must not be empty",
                        ));
                    }
                    if !seen.insert(field.name.as_str()) {
                        return Err(RangerError::new(
                            codes::TYPES_INVALID_STRUCT_FIELD,
                            format!("duplicate struct field name: {}", field.name),
                        ));
                    }
                    field.data_type.validate()?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Whether this is a composite (list, map, or struct) type.
    pub fn is_complex(&self) -> bool {
        matches!(self, Self::List(_) | Self::Map(_, _) | Self::Struct(_))
    }

    /// Nesting depth of composite constructors; 0 iff the type is primitive.
    pub fn complexity(&self) -> u32 {
        match self {
            Self::List(elem) => 1 + elem.complexity(),
            Self::Map(key, value) => 1 + key.complexity().max(value.complexity()),
            Self::Struct(fields) => {
                1 + fields
                    .iter()
                    .map(|f| f.data_type.complexity())
                    .max()
                    .unwrap_or(0)
            }
            _ => 0,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => f.write_str("boolean"),
            Self::Int32 => f.write_str("int32"),
            Self::Int64 => f.write_str("int64"),
            Self::Float32 => f.write_str("float32"),
            Self::Float64 => f.write_str("float64"),
            Self::Decimal { precision, scale } => write!(f, "decimal({precision},{scale})"),
            Self::String => f.write_str("string"),
            Self::Binary => f.write_str("binary"),
            Self::Date => f.write_str("date"),
            Self::Time => f.write_str("time"),
            Self::Timestamp => f.write_str("timestamp"),
            Self::TimestampTz => f.write_str("timestamptz"),
            Self::Uuid => f.write_str("uuid"),
            Self::List(elem) => write!(f, "list<{elem}>"),
            Self::Map(key, value) => write!(f, "map<{key},{value}>"),
            Self::Struct(fields) => {
                f.write_str("struct<")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}:{}", field.name, field.data_type)?;
                }
                f.write_str(">")
            }
        }
    }
}

struct TypeParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> TypeParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn skip_ws(&mut self) {
        while self.rest().starts_with(' ') {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn expect(&mut self, c: char) -> Result<()> {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(RangerError::new(
                codes::TYPES_UNSUPPORTED_TYPE,
                format!("expected {c:?} at offset {} in {:?}", self.pos, self.input),
            ))
        }
    }

    fn ident(&mut self) -> &'a str {
        self.skip_ws();
        let start = self.pos;
        for c in self.rest().chars() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        &self.input[start..self.pos]
    }

    fn integer(&mut self, what: &str, code: &str) -> Result<u32> {
        let raw = self.ident();
        raw.parse().map_err(|_| {
            RangerError::new(code, format!("invalid decimal {what}: {raw:?}"))
        })
    }

    fn parse_type(&mut self) -> Result<DataType> {
        let name = self.ident();
        match name {
            "boolean" => Ok(DataType::Boolean),
            "int32" => Ok(DataType::Int32),
            "int64" => Ok(DataType::Int64),
            "float32" => Ok(DataType::Float32),
            "float64" => Ok(DataType::Float64),
            "string" => Ok(DataType::String),
            "binary" => Ok(DataType::Binary),
            "date" => Ok(DataType::Date),
            "time" => Ok(DataType::Time),
            "timestamp" => Ok(DataType::Timestamp),
            "timestamptz" => Ok(DataType::TimestampTz),
            "uuid" => Ok(DataType::Uuid),
            "decimal" => {
                self.expect('(')?;
                let precision =
                    self.integer("precision", codes::TYPES_INVALID_DECIMAL_PRECISION)?;
                self.expect(',')?;
                let scale = self.integer("scale", codes::TYPES_INVALID_DECIMAL_SCALE)?;
                self.expect(')')?;
                Ok(DataType::Decimal { precision, scale })
            }
            "list" => {
                self.expect('<')?;
                let elem = self.parse_type().map_err(|e| {
                    RangerError::new(codes::TYPES_INVALID_LIST_ELEMENT, e.message().to_string())
                })?;
                self.expect('>')?;
                Ok(DataType::List(Box::new(elem)))
            }
            "map" => {
                self.expect('<')?;
                let key = self.parse_type().map_err(|e| {
                    RangerError::new(codes::TYPES_INVALID_MAP_KEY_TYPE, e.message().to_string())
                })?;
                self.expect(',')?;
                let value = self.parse_type().map_err(|e| {
                    RangerError::new(codes::TYPES_INVALID_MAP_VALUE_TYPE, e.message().to_string())
                })?;
                self.expect('>')?;
                Ok(DataType::Map(Box::new(key), Box::new(value)))
            }
            "struct" => {
                self.expect('<')?;
                let mut fields = Vec::new();
                loop {
                    let field_name = self.ident();
                    if field_name.is_empty() {
                        return Err(RangerError::new(
                            codes::TYPES_INVALID_STRUCT_FIELD,
                            "struct field name must not be empty",
                        ));
                    }
                    self.expect(':')?;
                    let field_type = self.parse_type()?;
                    fields.push(StructField {
                        name: field_name.to_string(),
                        data_type: field_type,
                    });
                    self.skip_ws();
                    match self.peek() {
                        Some(',') => {
                            self.pos += 1;
                        }
                        Some('>') => {
                            self.pos += 1;
                            break;
                        }
                        _ => {
                            return Err(RangerError::new(
                                codes::TYPES_UNSUPPORTED_TYPE,
                                format!("unterminated struct type: {:?}", self.input),
                            ))
                        }
                    }
                }
                Ok(DataType::Struct(fields))
            }
            "" => Err(RangerError::new(
                codes::TYPES_INVALID_PRIMITIVE_TYPE,
                format!("empty type name in {:?}", self.input),
            )),
            other => Err(RangerError::new(
                codes::TYPES_INVALID_PRIMITIVE_TYPE,
                format!("unknown type name: {other:?}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROUND_TRIP: &[&str] = &[
        "boolean",
        "int32",
        "int64",
        "float32",
        "float64",
        "decimal(10,2)",
        "string",
        "binary",
        "date",
        "time",
        "timestamp",
        "timestamptz",
        "uuid",
        "list<int64>",
        "list<list<string>>",
        "map<string,int64>",
        "map<string,list<float64>>",
        "struct<a:int32,b:string>",
        "struct<outer:struct<inner:decimal(5,1)>,flag:boolean>",
    ];

    #[test]
    fn test_round_trip_every_supported_type() {
        for raw in ROUND_TRIP {
            let ty = DataType::parse(raw).unwrap_or_else(|e| panic!("{raw}: {e}"));
            assert_eq!(ty.to_string(), *raw);
        }
    }

    #[test]
    fn test_decimal_bounds() {
        assert_eq!(
            DataType::parse("decimal(0,0)").unwrap_err().code().as_str(),
            codes::TYPES_INVALID_DECIMAL_PRECISION
        );
        assert_eq!(
            DataType::parse("decimal(5,6)").unwrap_err().code().as_str(),
            codes::TYPES_DECIMAL_SCALE_EXCEEDS_PRECISION
        );
        assert!(DataType::parse("decimal(5,0)").is_ok());
        assert!(DataType::parse("decimal(5,5)").is_ok());
    }

    #[test]
    fn test_struct_field_rules() {
        let dup = DataType::Struct(vec![
            StructField {
                name: "a".into(),
                data_type: DataType::Int32,
            },
            StructField {
                name: "a".into(),
                data_type: DataType::Int64,
            },
        ]);
        assert_eq!(
            dup.validate().unwrap_err().code().as_str(),
            codes::TYPES_INVALID_STRUCT_FIELD
        );

        let empty = DataType::Struct(vec![StructField {
            name: String::new(),
            data_type: DataType::Int32,
        }]);
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_unknown_type_name() {
        assert_eq!(
            DataType::parse("varchar").unwrap_err().code().as_str(),
            codes::TYPES_INVALID_PRIMITIVE_TYPE
        );
    }

    #[test]
    fn test_complexity_agrees_with_is_complex() {
        for raw in ROUND_TRIP {
            let ty = DataType::parse(raw).unwrap();
            assert_eq!(ty.complexity() == 0, !ty.is_complex(), "{raw}");
        }
        let nested = DataType::parse("map<string,list<list<int64>>>").unwrap();
        assert_eq!(nested.complexity(), 3);
    }
}
