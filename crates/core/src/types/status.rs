//! Status enums for orders, payments and users.
//!
//! These are stored as `TEXT` columns; `as_str` and `FromStr` are the
//! canonical database representations and match the JSON wire format.

use serde::{Deserialize, Serialize};

/// Error returned when parsing an unknown enum label.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value}")]
pub struct UnknownVariant {
    /// Which enum was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Order lifecycle status.
///
/// ```text
/// Unpaid         -> Cancelled
/// Placed         -> Packing | Shipped | OutForDelivery | Delivered | Cancelled
/// Packing        -> Shipped | OutForDelivery | Delivered | Cancelled
/// Shipped        -> OutForDelivery | Delivered
/// OutForDelivery -> Delivered
/// ```
///
/// `Unpaid -> Placed` is not in this table: it only happens through payment
/// verification, never through a manual status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Online order awaiting gateway confirmation.
    Unpaid,
    /// Confirmed order (COD at creation, online after verification).
    Placed,
    Packing,
    Shipped,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Database / wire label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unpaid => "Unpaid",
            Self::Placed => "Placed",
            Self::Packing => "Packing",
            Self::Shipped => "Shipped",
            Self::OutForDelivery => "OutForDelivery",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Whether a manual (admin) status update may move an order from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use OrderStatus::{Cancelled, Delivered, OutForDelivery, Packing, Placed, Shipped, Unpaid};

        matches!(
            (self, next),
            (Unpaid, Cancelled)
                | (Placed, Packing | Shipped | OutForDelivery | Delivered | Cancelled)
                | (Packing, Shipped | OutForDelivery | Delivered | Cancelled)
                | (Shipped, OutForDelivery | Delivered)
                | (OutForDelivery, Delivered)
        )
    }

    /// Terminal states accept no further manual transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unpaid" => Ok(Self::Unpaid),
            "Placed" => Ok(Self::Placed),
            "Packing" => Ok(Self::Packing),
            "Shipped" => Ok(Self::Shipped),
            "OutForDelivery" => Ok(Self::OutForDelivery),
            "Delivered" => Ok(Self::Delivered),
            "Cancelled" => Ok(Self::Cancelled),
            _ => Err(UnknownVariant {
                kind: "order status",
                value: s.to_owned(),
            }),
        }
    }
}

/// How an order is paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Cash on delivery; stock is reserved at order creation.
    Cod,
    /// Card payment through the hosted checkout gateway.
    Online,
}

impl PaymentMethod {
    /// Database / wire label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cod => "cod",
            Self::Online => "online",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cod" => Ok(Self::Cod),
            "online" => Ok(Self::Online),
            _ => Err(UnknownVariant {
                kind: "payment method",
                value: s.to_owned(),
            }),
        }
    }
}

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Regular shopper.
    #[default]
    Customer,
    /// Catalog and order management.
    Admin,
}

impl UserRole {
    /// Database / wire label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "admin" => Ok(Self::Admin),
            _ => Err(UnknownVariant {
                kind: "user role",
                value: s.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_transitions() {
        assert!(OrderStatus::Placed.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Unpaid.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Unpaid.can_transition_to(OrderStatus::Placed));
        assert!(!OrderStatus::Unpaid.can_transition_to(OrderStatus::Packing));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Placed));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Placed));
    }

    #[test]
    fn test_labels_round_trip_through_from_str() {
        for status in [
            OrderStatus::Unpaid,
            OrderStatus::Placed,
            OrderStatus::OutForDelivery,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
        assert!("placed".parse::<OrderStatus>().is_err());
        assert_eq!("online".parse::<PaymentMethod>(), Ok(PaymentMethod::Online));
        assert_eq!("admin".parse::<UserRole>(), Ok(UserRole::Admin));
    }

    #[test]
    fn test_wire_format_matches_labels() {
        let json = serde_json::to_string(&PaymentMethod::Cod).unwrap_or_default();
        assert_eq!(json, "\"cod\"");
        let json = serde_json::to_string(&OrderStatus::OutForDelivery).unwrap_or_default();
        assert_eq!(json, "\"OutForDelivery\"");
    }
}
