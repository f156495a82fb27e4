//! Convert serde_json::Value to a bindable PostgreSQL parameter.
//! Every value is sent as text; placeholders carry an explicit cast to the column type.

use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::Database;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PgBindValue(Option<String>);

impl PgBindValue {
    pub fn from_json(v: &Value) -> Self {
        PgBindValue(match v {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Array(_) | Value::Object(_) => Some(v.to_string()),
        })
    }

    pub fn as_text(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        match &self.0 {
            Some(s) => <&str as Encode<Postgres>>::encode_by_ref(&s.as_str(), buf),
            None => Ok(IsNull::Yes),
        }
    }
}

impl sqlx::Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}
