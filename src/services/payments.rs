//! Payment gateway contract.
//!
//! The storefront never talks to the gateway over the network. It opens a
//! payment intent carrying a gateway order id, the client pays with the
//! gateway directly, and the gateway hands back a payment id plus an
//! HMAC-SHA256 signature of `gateway_order_id|payment_id` keyed with the
//! shared secret. Only a valid signature confirms an order.

use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::aggregates::Order;
use crate::error::{Result, StoreError};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct PaymentIntent {
    pub order_id: Uuid,
    pub gateway_order_id: String,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Clone)]
pub struct PaymentGateway {
    secret: String,
}

impl PaymentGateway {
    pub fn new(secret: impl Into<String>) -> Self { Self { secret: secret.into() } }

    pub fn open_intent(&self, order: &Order) -> PaymentIntent {
        let gateway_order_id = order.payment.gateway_order_id.clone()
            .unwrap_or_else(|| format!("gw_{}", Uuid::new_v4().simple()));
        PaymentIntent {
            order_id: order.id,
            gateway_order_id,
            amount: order.total.amount(),
            currency: order.total.currency().to_string(),
        }
    }

    /// Hex signature the gateway would send for this payment.
    pub fn sign(&self, gateway_order_id: &str, payment_id: &str) -> Result<String> {
        let mac = self.mac(gateway_order_id, payment_id)?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Constant-time check of a hex signature.
    pub fn verify(&self, gateway_order_id: &str, payment_id: &str, signature: &str) -> Result<bool> {
        let Ok(expected) = hex::decode(signature.trim()) else { return Ok(false) };
        Ok(self.mac(gateway_order_id, payment_id)?.verify_slice(&expected).is_ok())
    }

    fn mac(&self, gateway_order_id: &str, payment_id: &str) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| StoreError::Internal(format!("payment key: {}", e)))?;
        mac.update(gateway_order_id.as_bytes());
        mac.update(b"|");
        mac.update(payment_id.as_bytes());
        Ok(mac)
    }
}

/// SHA-256 over a canonical request body, used to tell a genuine retry from a
/// different request reusing the same idempotency key.
pub fn fingerprint(canonical: &str) -> String {
    hex::encode(Sha256::digest(canonical.as_bytes()))
}
