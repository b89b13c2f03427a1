//! Customer Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;
use crate::domain::aggregates::order::Address;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub phone: Option<String>,
    pub default_address: Option<Address>,
    pub role: Role,
    pub blocked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role { #[default] Customer, Admin }

impl Customer {
    pub fn register(name: &str, email: &str, password_hash: String, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), name: name.trim().to_string(), email: Self::normalize_email(email),
            password_hash, phone: None, default_address: None, role, blocked: false,
            created_at: now, updated_at: now,
        }
    }

    pub fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }

    pub fn is_admin(&self) -> bool { self.role == Role::Admin }

    pub fn block(&mut self) { self.blocked = true; self.touch(); }
    pub fn unblock(&mut self) { self.blocked = false; self.touch(); }

    pub fn update_profile(&mut self, name: Option<String>, phone: Option<String>, address: Option<Address>) {
        if let Some(name) = name { self.name = name.trim().to_string(); }
        if phone.is_some() { self.phone = phone; }
        if address.is_some() { self.default_address = address; }
        self.touch();
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_normalizes_email() {
        let c = Customer::register(" Ravi ", " Ravi@Example.COM ", "hash".into(), Role::Customer);
        assert_eq!(c.email, "ravi@example.com");
        assert_eq!(c.name, "Ravi");
        assert!(!c.is_admin());
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let c = Customer::register("A", "a@b.co", "secret-hash".into(), Role::Admin);
        let json = serde_json::to_value(&c).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "admin");
    }
}
