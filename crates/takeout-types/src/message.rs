//! Protocol message types.
//!
//! Every takeout peer exchanges the same envelope: a kind drawn from a fixed
//! enumeration plus a bounded UTF-8 text payload.

use crate::error::TypesError;
use crate::token::Token;

/// Maximum payload length in bytes.
pub const MAX_PAYLOAD_LEN: usize = 2048;

/// Message discriminator.
///
/// The numeric values are part of the wire format and must stay stable.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Broker-side failure notice (e.g. registry full).
    Error = 0,
    /// Liveness signal.
    KeepAlive = 1,
    /// Customer asks for options; also the discovery announcement.
    RequestMenu = 2,
    /// Menu text, from a restaurant or relayed to a customer.
    Menu = 3,
    /// Restaurant choice (from a customer) or a meal order.
    Order = 4,
    /// Preparation estimate from a restaurant.
    EstimatedTime = 5,
    /// List of known restaurants sent to a customer.
    RestaurantOptions = 6,
    /// The chosen restaurant is not currently active.
    RestaurantUnavailable = 7,
    /// Customer selects a restaurant by index.
    ChooseRestaurant = 8,
    /// Orderly departure.
    Leave = 9,
}

impl MessageKind {
    pub const ALL: [MessageKind; 10] = [
        Self::Error,
        Self::KeepAlive,
        Self::RequestMenu,
        Self::Menu,
        Self::Order,
        Self::EstimatedTime,
        Self::RestaurantOptions,
        Self::RestaurantUnavailable,
        Self::ChooseRestaurant,
        Self::Leave,
    ];

    /// Wire value of this kind.
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for MessageKind {
    type Error = TypesError;

    fn try_from(value: u32) -> Result<Self, TypesError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_u32() == value)
            .ok_or(TypesError::InvalidMessageKind(value))
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Error => "Error",
            Self::KeepAlive => "KeepAlive",
            Self::RequestMenu => "RequestMenu",
            Self::Menu => "Menu",
            Self::Order => "Order",
            Self::EstimatedTime => "EstimatedTime",
            Self::RestaurantOptions => "RestaurantOptions",
            Self::RestaurantUnavailable => "RestaurantUnavailable",
            Self::ChooseRestaurant => "ChooseRestaurant",
            Self::Leave => "Leave",
        };
        f.write_str(name)
    }
}

/// Bounded message text.
///
/// At most [`MAX_PAYLOAD_LEN`] bytes of UTF-8 without NUL bytes, since NUL
/// pads the fixed-size wire record. Oversized text is rejected rather than
/// truncated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Payload(String);

impl Payload {
    pub fn new(text: impl Into<String>) -> Result<Self, TypesError> {
        let text = text.into();
        if text.len() > MAX_PAYLOAD_LEN {
            return Err(TypesError::PayloadTooLarge {
                len: text.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        if text.as_bytes().contains(&0) {
            return Err(TypesError::PayloadContainsNul);
        }
        Ok(Self(text))
    }

    #[must_use]
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A typed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub payload: Payload,
}

impl Message {
    /// Build a message, validating the payload bound.
    pub fn new(kind: MessageKind, text: impl Into<String>) -> Result<Self, TypesError> {
        Ok(Self {
            kind,
            payload: Payload::new(text)?,
        })
    }

    /// A message with no payload text.
    #[must_use]
    pub fn bare(kind: MessageKind) -> Self {
        Self {
            kind,
            payload: Payload::empty(),
        }
    }

    #[must_use]
    pub fn keep_alive() -> Self {
        Self::bare(MessageKind::KeepAlive)
    }

    /// The discovery announcement restaurants listen for.
    #[must_use]
    pub fn request_menu() -> Self {
        Self {
            kind: MessageKind::RequestMenu,
            payload: Payload("REQUEST_MENU".to_string()),
        }
    }

    pub fn text(&self) -> &str {
        self.payload.as_str()
    }
}

/// Text tagged with the token of the customer it belongs to.
///
/// Carried by `Order` records sent to a restaurant and by the
/// `EstimatedTime` records a restaurant sends back, as `<token>:<body>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlated {
    pub token: Token,
    pub body: String,
}

impl Correlated {
    pub fn new(token: Token, body: impl Into<String>) -> Self {
        Self {
            token,
            body: body.into(),
        }
    }

    pub fn to_payload(&self) -> Result<Payload, TypesError> {
        Payload::new(format!("{}:{}", self.token, self.body))
    }

    pub fn parse(payload: &Payload) -> Result<Self, TypesError> {
        let (token, body) = payload
            .as_str()
            .split_once(':')
            .ok_or_else(|| TypesError::MalformedCorrelation(payload.to_string()))?;
        Ok(Self {
            token: token.parse()?,
            body: body.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_values_are_stable() {
        let values: Vec<u32> = MessageKind::ALL.iter().map(|k| k.as_u32()).collect();
        assert_eq!(values, (0..10).collect::<Vec<_>>());
        assert_eq!(MessageKind::Leave.as_u32(), 9);
        assert_eq!(MessageKind::ChooseRestaurant.as_u32(), 8);
    }

    #[test]
    fn kind_from_wire_value() {
        assert_eq!(MessageKind::try_from(5).unwrap(), MessageKind::EstimatedTime);
        assert_eq!(
            MessageKind::try_from(10).unwrap_err(),
            TypesError::InvalidMessageKind(10)
        );
    }

    #[test]
    fn payload_accepts_maximum_length() {
        let text = "x".repeat(MAX_PAYLOAD_LEN);
        assert_eq!(Payload::new(text).unwrap().len(), MAX_PAYLOAD_LEN);
    }

    #[test]
    fn payload_rejects_oversized_text() {
        let err = Payload::new("x".repeat(MAX_PAYLOAD_LEN + 1)).unwrap_err();
        assert_eq!(
            err,
            TypesError::PayloadTooLarge {
                len: MAX_PAYLOAD_LEN + 1,
                max: MAX_PAYLOAD_LEN
            }
        );
    }

    #[test]
    fn payload_rejects_nul() {
        assert_eq!(
            Payload::new("a\0b").unwrap_err(),
            TypesError::PayloadContainsNul
        );
    }

    #[test]
    fn correlated_roundtrip() {
        let token = Token::new();
        let order = Correlated::new(token, "2: Margherita Pizza");
        let payload = order.to_payload().unwrap();
        assert!(payload.as_str().starts_with(&token.to_string()));

        let parsed = Correlated::parse(&payload).unwrap();
        assert_eq!(parsed.token, token);
        assert_eq!(parsed.body, "2: Margherita Pizza");
    }

    #[test]
    fn correlated_requires_separator() {
        let payload = Payload::new("12").unwrap();
        assert!(matches!(
            Correlated::parse(&payload),
            Err(TypesError::MalformedCorrelation(_))
        ));
    }

    #[test]
    fn request_menu_announcement_text() {
        let msg = Message::request_menu();
        assert_eq!(msg.kind, MessageKind::RequestMenu);
        assert_eq!(msg.text(), "REQUEST_MENU");
    }
}
