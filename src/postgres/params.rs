use std::error::Error;

use chrono::NaiveTime;
use tokio_postgres::types::{IsNull, ToSql, Type};
use tokio_util::bytes;

use crate::error::SqlDriverError;
use crate::types::RowValues;

fn is_text(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    )
}

impl RowValues {
    fn kind(&self) -> &'static str {
        match self {
            RowValues::Int(_) => "integer",
            RowValues::Float(_) => "float",
            RowValues::Text(_) => "text",
            RowValues::Bool(_) => "boolean",
            RowValues::Timestamp(_) => "timestamp",
            RowValues::Date(_) => "date",
            RowValues::Null => "null",
            RowValues::JSON(_) => "json",
            RowValues::Blob(_) => "blob",
        }
    }

    /// Whether this value has an encoding for a parameter of type `ty`.
    fn binds_to(&self, ty: &Type) -> bool {
        match self {
            RowValues::Null => true,
            RowValues::Int(_) => {
                matches!(
                    *ty,
                    Type::INT2 | Type::INT4 | Type::INT8 | Type::FLOAT4 | Type::FLOAT8
                ) || is_text(ty)
            }
            RowValues::Float(_) => matches!(*ty, Type::FLOAT4 | Type::FLOAT8) || is_text(ty),
            RowValues::Text(_) => <String as ToSql>::accepts(ty),
            RowValues::Bool(_) => *ty == Type::BOOL || is_text(ty),
            RowValues::Timestamp(_) | RowValues::Date(_) => {
                matches!(*ty, Type::TIMESTAMP | Type::TIMESTAMPTZ | Type::DATE)
            }
            RowValues::JSON(_) => matches!(*ty, Type::JSON | Type::JSONB),
            RowValues::Blob(_) => *ty == Type::BYTEA,
        }
    }
}

impl ToSql for RowValues {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            // Narrow to the width the server inferred for the placeholder.
            RowValues::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                #[allow(clippy::cast_precision_loss)]
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                #[allow(clippy::cast_precision_loss)]
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                _ if is_text(ty) => i.to_string().to_sql(ty, out),
                _ => i.to_sql(ty, out),
            },
            RowValues::Float(f) => match *ty {
                #[allow(clippy::cast_possible_truncation)]
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                _ if is_text(ty) => f.to_string().to_sql(ty, out),
                _ => f.to_sql(ty, out),
            },
            RowValues::Text(s) => s.to_sql(ty, out),
            RowValues::Bool(b) => {
                if is_text(ty) {
                    b.to_string().to_sql(ty, out)
                } else {
                    b.to_sql(ty, out)
                }
            }
            RowValues::Timestamp(dt) => {
                if *ty == Type::DATE {
                    dt.date().to_sql(ty, out)
                } else {
                    dt.to_sql(ty, out)
                }
            }
            RowValues::Date(d) => match *ty {
                Type::TIMESTAMP | Type::TIMESTAMPTZ => d.and_time(NaiveTime::MIN).to_sql(ty, out),
                _ => d.to_sql(ty, out),
            },
            RowValues::Null => Ok(IsNull::Yes),
            RowValues::JSON(jsval) => jsval.to_sql(ty, out),
            RowValues::Blob(bytes) => bytes.to_sql(ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        match *ty {
            Type::INT2 | Type::INT4 | Type::INT8 => true,
            Type::FLOAT4 | Type::FLOAT8 => true,
            Type::BOOL => true,
            Type::TIMESTAMP | Type::TIMESTAMPTZ | Type::DATE => true,
            Type::JSON | Type::JSONB => true,
            Type::BYTEA => true,
            _ => <String as ToSql>::accepts(ty),
        }
    }

    // NULL binds to a parameter of any type; every other value is checked
    // against its own encodings rather than the union in `accepts`.
    fn to_sql_checked(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        if self.is_null() {
            return Ok(IsNull::Yes);
        }
        if !self.binds_to(ty) {
            return Err(Box::new(SqlDriverError::ParameterError(format!(
                "cannot bind {} value to a parameter of type {ty} (cast the placeholder)",
                self.kind()
            ))));
        }
        self.to_sql(ty, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &RowValues, ty: &Type) -> Vec<u8> {
        let mut out = bytes::BytesMut::new();
        value.to_sql_checked(ty, &mut out).unwrap();
        out.to_vec()
    }

    #[test]
    fn integers_follow_the_column_width() {
        assert_eq!(encode(&RowValues::Int(7), &Type::INT2), 7i16.to_be_bytes());
        assert_eq!(encode(&RowValues::Int(7), &Type::INT4), 7i32.to_be_bytes());
        assert_eq!(encode(&RowValues::Int(7), &Type::INT8), 7i64.to_be_bytes());
    }

    #[test]
    fn out_of_range_integer_is_an_error() {
        let mut out = bytes::BytesMut::new();
        assert!(RowValues::Int(1 << 40).to_sql_checked(&Type::INT4, &mut out).is_err());
    }

    #[test]
    fn scalars_bound_to_text_are_rendered() {
        assert_eq!(encode(&RowValues::Int(42), &Type::TEXT), b"42");
        assert_eq!(encode(&RowValues::Bool(true), &Type::TEXT), b"true");
    }

    #[test]
    fn null_binds_to_any_parameter_type() {
        for ty in [Type::DATE, Type::NUMERIC, Type::UUID, Type::INET] {
            let mut out = bytes::BytesMut::new();
            let is_null = RowValues::Null.to_sql_checked(&ty, &mut out).unwrap();
            assert!(matches!(is_null, IsNull::Yes), "{ty}");
            assert!(out.is_empty());
        }
    }

    #[test]
    fn unsupported_parameter_type_names_the_type() {
        let mut out = bytes::BytesMut::new();
        let err = RowValues::Float(1.5)
            .to_sql_checked(&Type::NUMERIC, &mut out)
            .err().unwrap();
        let err = err.downcast::<SqlDriverError>().unwrap();
        assert!(matches!(*err, SqlDriverError::ParameterError(_)));
        let message = err.to_string();
        assert!(message.contains("float"), "{message}");
        assert!(message.contains("numeric"), "{message}");
        assert!(out.is_empty());
    }

    #[test]
    fn values_are_checked_against_their_own_encodings() {
        let mut out = bytes::BytesMut::new();
        assert!(RowValues::Int(1).to_sql_checked(&Type::JSONB, &mut out).is_err());
        assert!(RowValues::Text("x".into()).to_sql_checked(&Type::UUID, &mut out).is_err());
        assert!(RowValues::Bool(true).to_sql_checked(&Type::INT4, &mut out).is_err());
        assert_eq!(encode(&RowValues::Int(2), &Type::FLOAT4), 2f32.to_be_bytes());
    }

    #[test]
    fn unsupported_types_are_refused() {
        assert!(!<RowValues as ToSql>::accepts(&Type::UUID));
        assert!(!<RowValues as ToSql>::accepts(&Type::NUMERIC));
        assert!(<RowValues as ToSql>::accepts(&Type::JSONB));
        assert!(<RowValues as ToSql>::accepts(&Type::VARCHAR));
    }
}
