//! Test utilities: compact builders for transactions at each pipeline stage

use chrono::NaiveDate;

use crate::models::{
    Category, CategoryDistribution, ClassifiedTransaction, MerchantTransaction, PaymentMethod,
    Transaction, TransactionMetadata,
};

/// Parse a YYYY-MM-DD date, panicking on bad test input
pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid test date")
}

/// Merchant transaction paid by credit card, description = merchant name
pub fn merchant_tx(id: &str, on: &str, amount: f64, merchant: &str) -> MerchantTransaction {
    MerchantTransaction {
        transaction: Transaction {
            id: id.to_string(),
            date: date(on),
            amount,
            payment_method: PaymentMethod::CreditCard,
            description: merchant.to_lowercase(),
            has_discount: false,
            discount_percentage: None,
            metadata: TransactionMetadata::default(),
        },
        merchant_name: merchant.to_uppercase(),
        standardized_merchant: merchant.to_lowercase(),
        merchant_category_hint: None,
        merchant_is_known: false,
    }
}

/// Same as `merchant_tx` with an explicit description
pub fn described_tx(
    id: &str,
    on: &str,
    amount: f64,
    merchant: &str,
    description: &str,
) -> MerchantTransaction {
    let mut tx = merchant_tx(id, on, amount, merchant);
    tx.transaction.description = description.to_string();
    tx
}

/// Classified transaction with a fixed confidence and uniform distribution
pub fn classified_tx(
    id: &str,
    on: &str,
    amount: f64,
    merchant: &str,
    category: Category,
) -> ClassifiedTransaction {
    ClassifiedTransaction {
        merchant: merchant_tx(id, on, amount, merchant),
        predicted_category: category,
        prediction_confidence: 0.8,
        category_probabilities: CategoryDistribution::uniform(),
    }
}
