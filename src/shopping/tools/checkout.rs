use super::{keys, Shop, KITE_WALLET_ALIAS};
use crate::{
    agent::tool::{arg_str, required_arg, string_params, Tool, ToolContext},
    error::{Result, ShoppingError},
    model::is_six_digit_code,
    shopping::mandate::{
        round_cents, CartMandate, PaymentMandate, PaymentReceipt, SignedPaymentMandate, UserDevice,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

pub struct UpdateCart {
    shop: Arc<Shop>,
}

impl UpdateCart {
    pub fn new(shop: Arc<Shop>) -> Self {
        Self { shop }
    }
}

#[async_trait]
impl Tool for UpdateCart {
    fn name(&self) -> &str {
        "update_cart"
    }

    fn description(&self) -> &str {
        "Applies the user's shipping address to the chosen cart. Returns a new \
         cart mandate signed by the merchant with updated shipping and tax."
    }

    fn parameters(&self) -> Value {
        string_params(
            &[("shipping_address", "The complete shipping address to deliver to")],
            &["shipping_address"],
        )
    }

    async fn call(&self, args: Value, ctx: &mut ToolContext<'_>) -> Result<Value> {
        let shipping_address = required_arg(&args, "shipping_address")?;
        let cart: CartMandate = ctx.require(keys::CART_MANDATE)?;
        if cart.contents.is_expired(Utc::now()) {
            return Err(ShoppingError::Payment(
                "The cart has expired; search for products again".to_string(),
            ));
        }

        let mut contents = cart.contents;
        contents.shipping_address = Some(shipping_address.clone());
        contents.reprice();
        let updated = self.shop.catalog.signer().sign(contents)?;

        ctx.set(keys::SHIPPING_ADDRESS, &shipping_address)?;
        ctx.set(keys::CART_MANDATE, &updated)?;
        Ok(json!({"status": "success", "cart_mandate": updated}))
    }
}

pub struct CreatePaymentMandate {
    shop: Arc<Shop>,
}

impl CreatePaymentMandate {
    pub fn new(shop: Arc<Shop>) -> Self {
        Self { shop }
    }
}

#[async_trait]
impl Tool for CreatePaymentMandate {
    fn name(&self) -> &str {
        "create_payment_mandate"
    }

    fn description(&self) -> &str {
        "Creates a payment mandate for the current cart and payment method."
    }

    fn parameters(&self) -> Value {
        string_params(
            &[
                ("payment_method_alias", "The payment method the user chose"),
                ("user_email", "The user's email address"),
            ],
            &["payment_method_alias"],
        )
    }

    async fn call(&self, args: Value, ctx: &mut ToolContext<'_>) -> Result<Value> {
        let alias = arg_str(&args, "payment_method_alias")
            .or_else(|| ctx.get(keys::PAYMENT_METHOD_ALIAS))
            .unwrap_or_else(|| KITE_WALLET_ALIAS.to_string());
        let user_email = self.shop.user_email(&args, ctx);

        let cart: CartMandate = ctx.require(keys::CART_MANDATE)?;
        self.shop.catalog.signer().verify(&cart)?;

        let mandate = PaymentMandate::for_cart(&cart, &alias, &user_email)?;
        tracing::info!(
            payment_mandate_id = %mandate.id,
            amount = mandate.amount,
            "payment mandate created"
        );

        ctx.state.remove(keys::SIGNED_PAYMENT_MANDATE);
        ctx.state.remove(keys::PAYMENT_MANDATE_ACCEPTED);
        ctx.set(keys::PAYMENT_MANDATE, &mandate)?;
        Ok(json!({"status": "success", "payment_mandate": mandate}))
    }
}

pub struct SignMandatesOnUserDevice;

#[async_trait]
impl Tool for SignMandatesOnUserDevice {
    fn name(&self) -> &str {
        "sign_mandates_on_user_device"
    }

    fn description(&self) -> &str {
        "Signs the cart and payment mandates with the key on the user's device."
    }

    fn parameters(&self) -> Value {
        string_params(&[], &[])
    }

    async fn call(&self, _args: Value, ctx: &mut ToolContext<'_>) -> Result<Value> {
        let mandate: PaymentMandate = ctx.require(keys::PAYMENT_MANDATE)?;
        let device = UserDevice::for_email(&mandate.payer_email);
        let signed = device.sign(mandate)?;

        let public_key = signed.public_key.clone();
        ctx.set(keys::SIGNED_PAYMENT_MANDATE, &signed)?;
        Ok(json!({
            "status": "success",
            "message": "Cart and payment mandates signed on the user's device",
            "public_key": public_key,
        }))
    }
}

pub struct SendSignedPaymentMandateToCredentialsProvider {
    shop: Arc<Shop>,
}

impl SendSignedPaymentMandateToCredentialsProvider {
    pub fn new(shop: Arc<Shop>) -> Self {
        Self { shop }
    }
}

#[async_trait]
impl Tool for SendSignedPaymentMandateToCredentialsProvider {
    fn name(&self) -> &str {
        "send_signed_payment_mandate_to_credentials_provider"
    }

    fn description(&self) -> &str {
        "Sends the signed payment mandate to the credentials provider for verification."
    }

    fn parameters(&self) -> Value {
        string_params(&[], &[])
    }

    async fn call(&self, _args: Value, ctx: &mut ToolContext<'_>) -> Result<Value> {
        let signed: SignedPaymentMandate = ctx.require(keys::SIGNED_PAYMENT_MANDATE)?;
        let cart: CartMandate = ctx.require(keys::CART_MANDATE)?;

        self.shop.catalog.signer().verify(&cart)?;
        signed.verify()?;
        if signed.mandate.cart_hash != cart.contents.hash()? {
            return Err(ShoppingError::Payment(
                "Payment mandate was signed for a different cart".to_string(),
            ));
        }

        let provider = ctx
            .get::<Value>(keys::PAYMENT_CREDENTIAL_TOKEN)
            .and_then(|token| token.get("url").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| "demo://kite-wallet".to_string());
        ctx.set(keys::PAYMENT_MANDATE_ACCEPTED, true)?;
        tracing::info!(payment_mandate_id = %signed.mandate.id, provider = %provider, "payment mandate accepted");

        Ok(json!({
            "status": "success",
            "message": "The credentials provider accepted the signed payment mandate",
            "credentials_provider": provider,
        }))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OtpChallenge {
    payment_mandate_id: String,
    issued_at: DateTime<Utc>,
}

// Why the agent's own limits forbid this payment, if they do.
fn agent_limit_violation(ctx: &ToolContext<'_>, amount: f64, now: DateTime<Utc>) -> Option<String> {
    if let Some(max_budget) = ctx.get::<f64>(keys::MAX_BUDGET) {
        if amount > max_budget {
            return Some(format!(
                "Payment of ${:.2} exceeds the agent's budget of ${:.2}",
                amount, max_budget
            ));
        }
    }
    let expiration = ctx
        .get_str(keys::EXPIRATION_TIME)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|time| time.with_timezone(&Utc));
    match expiration {
        Some(expiration) if now > expiration => {
            Some("The agent's spending authorization has expired".to_string())
        }
        _ => None,
    }
}

// A stored receipt for the same mandate means it was already charged.
fn ensure_unpaid(ctx: &ToolContext<'_>, payment_mandate_id: &str) -> Result<()> {
    match ctx.get::<PaymentReceipt>(keys::PAYMENT_RECEIPT) {
        Some(receipt) if receipt.payment_mandate_id == payment_mandate_id => Err(ShoppingError::Payment(
            "This payment mandate has already been paid".to_string(),
        )),
        _ => Ok(()),
    }
}

pub struct InitiatePayment {
    shop: Arc<Shop>,
}

impl InitiatePayment {
    pub fn new(shop: Arc<Shop>) -> Self {
        Self { shop }
    }
}

#[async_trait]
impl Tool for InitiatePayment {
    fn name(&self) -> &str {
        "initiate_payment"
    }

    fn description(&self) -> &str {
        "Initiates the payment for the signed payment mandate. May return an OTP \
         challenge that must be relayed to the user."
    }

    fn parameters(&self) -> Value {
        string_params(&[], &[])
    }

    async fn call(&self, _args: Value, ctx: &mut ToolContext<'_>) -> Result<Value> {
        let signed: SignedPaymentMandate = ctx.require(keys::SIGNED_PAYMENT_MANDATE)?;
        ensure_unpaid(ctx, &signed.mandate.id)?;
        if ctx.get::<bool>(keys::PAYMENT_MANDATE_ACCEPTED) != Some(true) {
            return Err(ShoppingError::Payment(
                "Send the signed payment mandate to the credentials provider first".to_string(),
            ));
        }

        let amount = signed.mandate.amount;
        let now = Utc::now();
        if let Some(reason) = agent_limit_violation(ctx, amount, now) {
            tracing::warn!(amount, "payment blocked: {}", reason);
            return Err(ShoppingError::Payment(reason));
        }
        if amount > self.shop.demo.wallet_balance {
            return Err(ShoppingError::Payment(format!(
                "Insufficient wallet balance: ${:.2} available",
                self.shop.demo.wallet_balance
            )));
        }

        let challenge = OtpChallenge {
            payment_mandate_id: signed.mandate.id.clone(),
            issued_at: now,
        };
        ctx.set(keys::OTP_CHALLENGE, &challenge)?;

        Ok(json!({
            "status": "otp_required",
            "challenge": {
                "type": "otp",
                "display_text": format!(
                    "Please enter the 6-digit code sent to your Kite wallet app to approve the payment of ${:.2} {}.",
                    round_cents(amount),
                    signed.mandate.currency
                ),
            },
        }))
    }
}

pub struct InitiatePaymentWithOtp;

#[async_trait]
impl Tool for InitiatePaymentWithOtp {
    fn name(&self) -> &str {
        "initiate_payment_with_otp"
    }

    fn description(&self) -> &str {
        "Retries the payment with the user's answer to the OTP challenge."
    }

    fn parameters(&self) -> Value {
        string_params(
            &[("challenge_response", "The OTP code the user entered")],
            &["challenge_response"],
        )
    }

    async fn call(&self, args: Value, ctx: &mut ToolContext<'_>) -> Result<Value> {
        let response = required_arg(&args, "challenge_response")?;
        let challenge: OtpChallenge = ctx
            .get(keys::OTP_CHALLENGE)
            .ok_or_else(|| ShoppingError::Payment("There is no pending payment challenge".to_string()))?;
        let signed: SignedPaymentMandate = ctx.require(keys::SIGNED_PAYMENT_MANDATE)?;
        if signed.mandate.id != challenge.payment_mandate_id {
            return Err(ShoppingError::Payment(
                "The payment challenge belongs to a different payment".to_string(),
            ));
        }
        ensure_unpaid(ctx, &signed.mandate.id)?;

        if !is_six_digit_code(&response) {
            return Err(ShoppingError::Payment(
                "Invalid OTP. Please enter a 6-digit number.".to_string(),
            ));
        }

        let receipt = PaymentReceipt::confirmed(&signed.mandate);
        tracing::info!(receipt_id = %receipt.receipt_id, amount = receipt.amount, "payment confirmed");
        ctx.state.remove(keys::OTP_CHALLENGE);
        ctx.set(keys::PAYMENT_RECEIPT, &receipt)?;

        Ok(json!({"status": "success", "payment_receipt": receipt}))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProofOfIntent {
    intent_id: String,
    user_email: String,
    wallet_address: String,
    merchant_name: String,
    item_sku: String,
    buywhenready_conditions: Value,
    cart_expiry: String,
    created_at: DateTime<Utc>,
}

pub struct DisplayKiteProofOfIntent {
    shop: Arc<Shop>,
}

impl DisplayKiteProofOfIntent {
    pub fn new(shop: Arc<Shop>) -> Self {
        Self { shop }
    }

    fn render(proof: &ProofOfIntent, digest: &str) -> String {
        let conditions = match &proof.buywhenready_conditions {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        format!(
            "Kite Proof of Intent\n\
             Intent ID: {}\n\
             User: {}\n\
             Wallet: {}\n\
             Merchant: {}\n\
             Item SKU: {}\n\
             Conditions: {}\n\
             Cart valid until: {}\n\
             Intent hash: {}",
            proof.intent_id,
            proof.user_email,
            proof.wallet_address,
            proof.merchant_name,
            proof.item_sku,
            conditions,
            proof.cart_expiry,
            digest
        )
    }
}

#[async_trait]
impl Tool for DisplayKiteProofOfIntent {
    fn name(&self) -> &str {
        "display_kite_proof_of_intent"
    }

    fn description(&self) -> &str {
        "Creates and displays a signed Kite proof of intent for a BuyWhenReady purchase."
    }

    fn parameters(&self) -> Value {
        string_params(
            &[
                ("user_email", "The user's email address"),
                ("wallet_address", "The user's Kite wallet address"),
                ("merchant_name", "The merchant selling the item"),
                ("item_sku", "SKU of the item to buy"),
                ("buywhenready_conditions", "The conditions that trigger the purchase"),
                ("cart_expiry", "When the cart mandate expires"),
            ],
            &[],
        )
    }

    async fn call(&self, args: Value, ctx: &mut ToolContext<'_>) -> Result<Value> {
        let cart: Option<CartMandate> = ctx.get(keys::CART_MANDATE);
        let contents = cart.as_ref().map(|cart| &cart.contents);

        // The proof commits the user to a purchase, so the agent's limits apply here too.
        if let Some(contents) = contents {
            if let Some(reason) = agent_limit_violation(ctx, contents.total, Utc::now()) {
                tracing::warn!(total = contents.total, "proof of intent blocked: {}", reason);
                return Err(ShoppingError::Payment(reason));
            }
        }

        let merchant_name = arg_str(&args, "merchant_name")
            .or_else(|| contents.map(|c| c.merchant_name.clone()))
            .unwrap_or_else(|| self.shop.catalog.merchant_name().to_string());
        let item_sku = arg_str(&args, "item_sku")
            .or_else(|| contents.and_then(|c| c.primary_sku()).map(str::to_string))
            .ok_or_else(|| ShoppingError::Tool("No item selected for BuyWhenReady".to_string()))?;
        let cart_expiry = arg_str(&args, "cart_expiry")
            .or_else(|| contents.map(|c| c.cart_expiry.to_rfc3339()))
            .unwrap_or_default();
        let wallet_address = arg_str(&args, "wallet_address")
            .or_else(|| ctx.get_str(keys::WALLET_ADDRESS).map(str::to_string))
            .unwrap_or_else(|| self.shop.demo.wallet_address.clone());
        let buywhenready_conditions = arg_str(&args, "buywhenready_conditions")
            .map(Value::String)
            .or_else(|| ctx.get::<Value>(keys::BUYWHENREADY_CONDITIONS))
            .ok_or_else(|| ShoppingError::Tool("No BuyWhenReady conditions were collected".to_string()))?;
        let user_email = self.shop.user_email(&args, ctx);

        let proof = ProofOfIntent {
            intent_id: format!("poi_{}", Uuid::new_v4().simple()),
            user_email,
            wallet_address,
            merchant_name,
            item_sku,
            buywhenready_conditions,
            cart_expiry,
            created_at: Utc::now(),
        };
        let digest = hex::encode(Sha256::digest(serde_json::to_vec(&proof)?));
        let display_text = Self::render(&proof, &digest);
        let device = UserDevice::for_email(&proof.user_email);

        let record = json!({
            "proof": proof,
            "intent_hash": digest,
            "public_key": device.public_key(),
        });
        ctx.set(keys::PROOF_OF_INTENT, &record)?;

        Ok(json!({
            "status": "success",
            "proof_of_intent": record,
            "display_text": display_text,
        }))
    }
}
