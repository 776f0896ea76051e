use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::Value;

/// Provider objects arrive either expanded or as a bare id.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    #[serde(deserialize_with = "bare_id")]
    Id(String),
    Object(T),
}

/// A string or numeric id; anything else is left for the next variant.
fn bare_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(de::Error::custom(format!("expected an id, got {}", other))),
    }
}

/// Ids and codes: strings, or numbers rendered as strings. Other types read as absent.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(value)) => Some(value),
        Some(Value::Number(value)) => Some(value.to_string()),
        _ => None,
    })
}

/// Amounts: numbers or numeric strings. Other types read as absent.
fn lenient_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(value)) => value.as_f64(),
        Some(Value::String(value)) => value.trim().parse().ok(),
        _ => None,
    })
}

pub trait ObjectId {
    fn object_id(&self) -> Option<&str>;
}

impl<T: ObjectId> Expandable<T> {
    pub fn id(&self) -> Option<&str> {
        let id = match self {
            Expandable::Id(id) => Some(id.as_str()),
            Expandable::Object(object) => object.object_id(),
        };
        id.filter(|id| !id.is_empty())
    }

    pub fn as_object(&self) -> Option<&T> {
        match self {
            Expandable::Object(object) => Some(object),
            Expandable::Id(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectRef {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
}

impl ObjectId for ObjectRef {
    fn object_id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductObject {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    /// Minor units.
    #[serde(default, deserialize_with = "lenient_amount")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub currency: Option<String>,
}

impl ObjectId for ProductObject {
    fn object_id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderObject {
    pub product: Option<Expandable<ObjectRef>>,
    /// Minor units.
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub currency: Option<String>,
    pub customer: Option<Expandable<ObjectRef>>,
}

/// Data object of a `checkout.completed` event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutObject {
    /// Checkout id.
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    pub product: Option<Expandable<ProductObject>>,
    pub order: Option<OrderObject>,
    pub customer: Option<Expandable<ObjectRef>>,
    pub subscription: Option<Expandable<ObjectRef>>,
}

impl CheckoutObject {
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.get(key))
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    /// `product.id`, then `order.product`.
    pub fn product_id(&self) -> Option<&str> {
        self.product
            .as_ref()
            .and_then(Expandable::id)
            .or_else(|| self.order.as_ref()?.product.as_ref()?.id())
    }

    /// `order.amount`, then `product.price`, in minor units.
    pub fn amount(&self) -> i64 {
        self.order
            .as_ref()
            .and_then(|order| order.amount)
            .or_else(|| self.product.as_ref()?.as_object()?.price)
            .map(|amount| amount.round() as i64)
            .unwrap_or(0)
    }

    pub fn currency(&self) -> String {
        self.order
            .as_ref()
            .and_then(|order| order.currency.clone())
            .or_else(|| self.product.as_ref()?.as_object()?.currency.clone())
            .unwrap_or_else(|| "USD".to_string())
    }

    pub fn customer_id(&self) -> Option<&str> {
        self.customer
            .as_ref()
            .and_then(Expandable::id)
            .or_else(|| self.order.as_ref()?.customer.as_ref()?.id())
    }

    /// Provider subscription id, falling back to the checkout id.
    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription
            .as_ref()
            .and_then(Expandable::id)
            .or(self.id.as_deref())
    }
}

/// Data object of a `subscription.*` event; only the metadata is read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionObject {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl SubscriptionObject {
    pub fn user_id(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.get("user_id"))
            .and_then(Value::as_str)
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
}
