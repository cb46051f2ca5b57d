use crate::{
    error::Result,
    shopping::mandate::{CartContents, CartMandate, LineItem, MerchantSigner},
};
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const MAX_CART_OPTIONS: usize = 3;
pub const CART_VALIDITY_MINUTES: i64 = 30;

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9]+").unwrap());

const FILLER_WORDS: &[&str] = &[
    "and", "buy", "for", "get", "looking", "need", "new", "pair", "please", "purchase", "shop",
    "some", "the", "want", "with",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub sku: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub tags: Vec<String>,
}

impl Product {
    fn new(sku: &str, name: &str, description: &str, price: f64, tags: &[&str]) -> Self {
        Self {
            sku: sku.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            price,
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
        }
    }

    fn score(&self, terms: &[String]) -> usize {
        let name = self.name.to_lowercase();
        terms
            .iter()
            .filter(|term| {
                let singular = term.strip_suffix('s').unwrap_or(term);
                self.tags.iter().any(|tag| tag == *term || tag == singular) || name.contains(singular)
            })
            .count()
    }
}

fn search_terms(intent: &str) -> Vec<String> {
    WORD.find_iter(&intent.to_lowercase())
        .map(|m| m.as_str().to_string())
        .filter(|word| word.len() >= 3 && !FILLER_WORDS.contains(&word.as_str()))
        .collect()
}

// The demo merchant: a fixed product list and a signer for its carts.
#[derive(Clone)]
pub struct Catalog {
    products: Vec<Product>,
    signer: MerchantSigner,
    currency: String,
}

impl Catalog {
    pub fn new(products: Vec<Product>, signer: MerchantSigner, currency: impl Into<String>) -> Self {
        Self {
            products,
            signer,
            currency: currency.into(),
        }
    }

    pub fn demo(signer: MerchantSigner, currency: impl Into<String>) -> Self {
        let products = vec![
            Product::new(
                "KD-SHOE-001",
                "Kite Runner Running Shoes",
                "Lightweight road running shoes with a breathable mesh upper",
                89.99,
                &["shoes", "shoe", "sneakers", "running", "footwear"],
            ),
            Product::new(
                "KD-SHOE-002",
                "Trailblazer Hiking Boots",
                "Waterproof leather boots for rough trails",
                149.00,
                &["boots", "boot", "shoes", "hiking", "footwear", "outdoor"],
            ),
            Product::new(
                "KD-SHOE-003",
                "Everyday Canvas Sneakers",
                "Classic low-top canvas sneakers",
                54.50,
                &["shoes", "shoe", "sneakers", "casual", "footwear"],
            ),
            Product::new(
                "KD-AUD-001",
                "Noise-Cancelling Headphones",
                "Over-ear wireless headphones with 30 hour battery",
                199.99,
                &["headphones", "audio", "music", "wireless"],
            ),
            Product::new(
                "KD-KIT-001",
                "Pour-Over Coffee Kit",
                "Glass dripper, filters and a gooseneck kettle",
                39.95,
                &["coffee", "kitchen", "kettle"],
            ),
            Product::new(
                "KD-BAG-001",
                "Weatherproof Daypack",
                "20 litre backpack with a padded laptop sleeve",
                74.00,
                &["backpack", "bag", "travel", "laptop"],
            ),
            Product::new(
                "KD-WAT-001",
                "Smart Fitness Watch",
                "Heart rate, GPS and sleep tracking",
                129.00,
                &["watch", "fitness", "smartwatch", "gps"],
            ),
        ];
        Self::new(products, signer, currency)
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn merchant_name(&self) -> &str {
        self.signer.merchant_name()
    }

    pub fn signer(&self) -> &MerchantSigner {
        &self.signer
    }

    // Products matching the intent, best match first. Falls back to the
    // head of the catalog when nothing matches.
    pub fn search(&self, intent: &str) -> Vec<&Product> {
        let terms = search_terms(intent);
        let mut scored: Vec<(usize, &Product)> = self
            .products
            .iter()
            .map(|product| (product.score(&terms), product))
            .filter(|(score, _)| *score > 0)
            .collect();

        // Nothing matched, offer something anyway
        if scored.is_empty() {
            return self.products.iter().take(MAX_CART_OPTIONS).collect();
        }
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored
            .into_iter()
            .take(MAX_CART_OPTIONS)
            .map(|(_, product)| product)
            .collect()
    }

    // One signed single-item cart per matching product.
    pub fn find_products(&self, intent: &str, now: DateTime<Utc>) -> Result<Vec<CartMandate>> {
        let expiry = now + Duration::minutes(CART_VALIDITY_MINUTES);
        self.search(intent)
            .into_iter()
            .map(|product| {
                let contents = CartContents::new(
                    self.merchant_name(),
                    vec![LineItem {
                        sku: product.sku.clone(),
                        name: product.name.clone(),
                        unit_price: product.price,
                        quantity: 1,
                    }],
                    self.currency.clone(),
                    expiry,
                );
                self.signer.sign(contents)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::demo(MerchantSigner::new("Kite Demo Store", "secret"), "USD")
    }

    #[test]
    fn test_search_terms_drop_filler() {
        assert_eq!(search_terms("I want to buy a pair of Running shoes!"), ["running", "shoes"]);
    }

    #[test]
    fn test_search_ranks_best_match_first() {
        let catalog = catalog();
        let results = catalog.search("running shoes");
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].sku, "KD-SHOE-001");
        assert!(results.iter().all(|p| p.tags.iter().any(|t| t == "footwear")));
    }

    #[test]
    fn test_unmatched_intent_offers_catalog() {
        let catalog = catalog();
        let results = catalog.search("a unicorn");
        assert_eq!(results.len(), MAX_CART_OPTIONS);
    }

    #[test]
    fn test_find_products_signs_carts() {
        let catalog = catalog();
        let now = Utc::now();
        let carts = catalog.find_products("coffee", now).unwrap();
        assert_eq!(carts.len(), 1);
        let cart = &carts[0];
        assert_eq!(cart.contents.primary_sku(), Some("KD-KIT-001"));
        assert_eq!(cart.contents.cart_expiry, now + Duration::minutes(30));
        assert!(catalog.signer().verify(cart).is_ok());
    }
}
