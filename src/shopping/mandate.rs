//! Cart and payment mandates for the demo checkout.
//!
//! A merchant signs the cart it offers (HS256 JWT over the cart hash), the
//! user's device signs the cart and payment mandates (Ed25519), and the
//! credentials provider checks both before a payment is attempted.

use crate::error::{Result, ShoppingError};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const FREE_SHIPPING_THRESHOLD: f64 = 100.0;
pub const FLAT_SHIPPING_RATE: f64 = 9.99;
pub const TAX_RATE: f64 = 0.0875;
pub const REFUND_PERIOD_DAYS: u32 = 30;

pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

fn sha256_hex<T: Serialize>(value: &T) -> Result<String> {
    let bytes = serde_json::to_vec(value)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub sku: String,
    pub name: String,
    pub unit_price: f64,
    pub quantity: u32,
}

impl LineItem {
    pub fn total(&self) -> f64 {
        self.unit_price * self.quantity as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartContents {
    pub id: String,
    pub merchant_name: String,
    pub items: Vec<LineItem>,
    pub shipping_address: Option<String>,
    pub subtotal: f64,
    pub shipping: f64,
    pub tax: f64,
    pub total: f64,
    pub currency: String,
    pub cart_expiry: DateTime<Utc>,
    pub refund_period_days: u32,
}

impl CartContents {
    pub fn new(
        merchant_name: impl Into<String>,
        items: Vec<LineItem>,
        currency: impl Into<String>,
        cart_expiry: DateTime<Utc>,
    ) -> Self {
        let mut contents = Self {
            id: format!("cart_{}", &Uuid::new_v4().simple().to_string()[..12]),
            merchant_name: merchant_name.into(),
            items,
            shipping_address: None,
            subtotal: 0.0,
            shipping: 0.0,
            tax: 0.0,
            total: 0.0,
            currency: currency.into(),
            cart_expiry,
            refund_period_days: REFUND_PERIOD_DAYS,
        };
        contents.reprice();
        contents
    }

    pub fn reprice(&mut self) {
        self.subtotal = round_cents(self.items.iter().map(LineItem::total).sum());
        self.shipping = if self.subtotal >= FREE_SHIPPING_THRESHOLD || self.items.is_empty() {
            0.0
        } else {
            FLAT_SHIPPING_RATE
        };
        self.tax = round_cents(self.subtotal * TAX_RATE);
        self.total = round_cents(self.subtotal + self.shipping + self.tax);
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.cart_expiry
    }

    pub fn primary_sku(&self) -> Option<&str> {
        self.items.first().map(|item| item.sku.as_str())
    }

    pub fn hash(&self) -> Result<String> {
        sha256_hex(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartMandate {
    pub contents: CartContents,
    /// Merchant JWT binding the cart hash; `None` until signed.
    pub merchant_authorization: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MerchantClaims {
    sub: String,
    iss: String,
    cart_hash: String,
    iat: i64,
    exp: i64,
}

/// Signs carts on behalf of the demo merchant.
#[derive(Clone)]
pub struct MerchantSigner {
    merchant_name: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl MerchantSigner {
    pub fn new(merchant_name: impl Into<String>, secret: &str) -> Self {
        Self {
            merchant_name: merchant_name.into(),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn merchant_name(&self) -> &str {
        &self.merchant_name
    }

    pub fn sign(&self, contents: CartContents) -> Result<CartMandate> {
        let claims = MerchantClaims {
            sub: contents.id.clone(),
            iss: self.merchant_name.clone(),
            cart_hash: contents.hash()?,
            iat: Utc::now().timestamp(),
            exp: contents.cart_expiry.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok(CartMandate {
            contents,
            merchant_authorization: Some(token),
        })
    }

    /// Checks the merchant JWT and that the cart has not changed since.
    pub fn verify(&self, mandate: &CartMandate) -> Result<()> {
        let token = mandate
            .merchant_authorization
            .as_deref()
            .ok_or_else(|| ShoppingError::Payment("Cart mandate is not signed by the merchant".to_string()))?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.merchant_name.as_str()]);
        let claims = decode::<MerchantClaims>(token, &self.decoding_key, &validation)?.claims;

        if claims.sub != mandate.contents.id || claims.cart_hash != mandate.contents.hash()? {
            return Err(ShoppingError::Payment(
                "Cart contents do not match the merchant authorization".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMandate {
    pub id: String,
    pub cart_id: String,
    pub cart_hash: String,
    pub merchant_name: String,
    pub payment_method_alias: String,
    pub payer_email: String,
    pub amount: f64,
    pub currency: String,
    pub shipping_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PaymentMandate {
    pub fn for_cart(cart: &CartMandate, payment_method_alias: &str, payer_email: &str) -> Result<Self> {
        Ok(Self {
            id: format!("pm_{}", Uuid::new_v4().simple()),
            cart_id: cart.contents.id.clone(),
            cart_hash: cart.contents.hash()?,
            merchant_name: cart.contents.merchant_name.clone(),
            payment_method_alias: payment_method_alias.to_string(),
            payer_email: payer_email.to_string(),
            amount: cart.contents.total,
            currency: cart.contents.currency.clone(),
            shipping_address: cart.contents.shipping_address.clone(),
            created_at: Utc::now(),
        })
    }

    pub fn hash(&self) -> Result<String> {
        sha256_hex(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedPaymentMandate {
    pub mandate: PaymentMandate,
    /// Hex Ed25519 signature over the cart hash.
    pub cart_signature: String,
    /// Hex Ed25519 signature over the payment mandate hash.
    pub payment_signature: String,
    /// Base64 Ed25519 verifying key of the signing device.
    pub public_key: String,
    pub algorithm: String,
}

impl SignedPaymentMandate {
    pub fn verify(&self) -> Result<()> {
        let key_bytes: [u8; 32] = STANDARD
            .decode(&self.public_key)
            .map_err(|e| ShoppingError::Auth(format!("Invalid device key: {}", e)))?
            .try_into()
            .map_err(|_| ShoppingError::Auth("Device key must be 32 bytes".to_string()))?;
        let verifying_key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| ShoppingError::Auth(format!("Invalid device key: {}", e)))?;

        verify_hex(&verifying_key, self.mandate.cart_hash.as_bytes(), &self.cart_signature)?;
        verify_hex(&verifying_key, self.mandate.hash()?.as_bytes(), &self.payment_signature)
    }
}

fn verify_hex(key: &VerifyingKey, message: &[u8], signature_hex: &str) -> Result<()> {
    let bytes: [u8; 64] = hex::decode(signature_hex)
        .map_err(|_| ShoppingError::Auth("Malformed device signature".to_string()))?
        .try_into()
        .map_err(|_| ShoppingError::Auth("Malformed device signature".to_string()))?;
    key.verify(message, &Signature::from_bytes(&bytes))
        .map_err(|_| ShoppingError::Auth("Device signature verification failed".to_string()))
}

/// The user's device key. Derived from the email so the same user always
/// signs with the same key in the demo.
pub struct UserDevice {
    signing_key: SigningKey,
}

impl UserDevice {
    pub fn for_email(email: &str) -> Self {
        let seed: [u8; 32] = Sha256::digest(email.trim().to_lowercase().as_bytes()).into();
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn public_key(&self) -> String {
        STANDARD.encode(self.signing_key.verifying_key().to_bytes())
    }

    fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.signing_key.sign(message).to_bytes())
    }

    pub fn sign(&self, mandate: PaymentMandate) -> Result<SignedPaymentMandate> {
        let payment_hash = mandate.hash()?;
        Ok(SignedPaymentMandate {
            cart_signature: self.sign_hex(mandate.cart_hash.as_bytes()),
            payment_signature: self.sign_hex(payment_hash.as_bytes()),
            public_key: self.public_key(),
            algorithm: "Ed25519".to_string(),
            mandate,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub receipt_id: String,
    pub payment_mandate_id: String,
    pub status: String,
    pub merchant_name: String,
    pub payment_method_alias: String,
    pub amount: f64,
    pub currency: String,
    pub shipping_address: Option<String>,
    pub transaction_reference: String,
    pub paid_at: DateTime<Utc>,
}

impl PaymentReceipt {
    pub fn confirmed(mandate: &PaymentMandate) -> Self {
        let reference = Uuid::new_v4().simple().to_string();
        Self {
            receipt_id: format!("rcpt_{}", &reference[..12]),
            payment_mandate_id: mandate.id.clone(),
            status: "confirmed".to_string(),
            merchant_name: mandate.merchant_name.clone(),
            payment_method_alias: mandate.payment_method_alias.clone(),
            amount: mandate.amount,
            currency: mandate.currency.clone(),
            shipping_address: mandate.shipping_address.clone(),
            transaction_reference: format!("0x{}", reference),
            paid_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item(price: f64, quantity: u32) -> LineItem {
        LineItem {
            sku: "SKU-1".to_string(),
            name: "Thing".to_string(),
            unit_price: price,
            quantity,
        }
    }

    fn cart(price: f64) -> CartContents {
        CartContents::new("Kite Demo Store", vec![item(price, 1)], "USD", Utc::now() + Duration::minutes(30))
    }

    #[test]
    fn test_pricing_rules() {
        let cheap = cart(40.0);
        assert_eq!(cheap.shipping, FLAT_SHIPPING_RATE);
        assert_eq!(cheap.tax, 3.5);
        assert_eq!(cheap.total, 53.49);

        let pricey = cart(120.0);
        assert_eq!(pricey.shipping, 0.0);
        assert_eq!(pricey.tax, 10.5);
        assert_eq!(pricey.total, 130.5);
    }

    #[test]
    fn test_merchant_signature_binds_contents() {
        let signer = MerchantSigner::new("Kite Demo Store", "secret");
        let mut mandate = signer.sign(cart(40.0)).unwrap();
        assert!(signer.verify(&mandate).is_ok());

        mandate.contents.items[0].unit_price = 1.0;
        mandate.contents.reprice();
        assert!(signer.verify(&mandate).is_err());

        let other = MerchantSigner::new("Kite Demo Store", "other-secret");
        assert!(other.verify(&signer.sign(cart(10.0)).unwrap()).is_err());
    }

    #[test]
    fn test_device_signatures() {
        let signer = MerchantSigner::new("Kite Demo Store", "secret");
        let cart = signer.sign(cart(40.0)).unwrap();
        let mandate = PaymentMandate::for_cart(&cart, "Kite User Wallet", "bugsbunny@gmail.com").unwrap();
        assert_eq!(mandate.amount, cart.contents.total);

        let device = UserDevice::for_email("BugsBunny@gmail.com ");
        assert_eq!(device.public_key(), UserDevice::for_email("bugsbunny@gmail.com").public_key());

        let mut signed = device.sign(mandate).unwrap();
        assert!(signed.verify().is_ok());

        signed.mandate.amount = 0.01;
        assert!(signed.verify().is_err());
    }
}
