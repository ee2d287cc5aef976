//! Customer ordering state machine.

/// Where a customer session stands in the ordering protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    /// Connected, nothing requested yet.
    Init,
    /// Restaurant options sent, waiting for a choice.
    OptionsSent,
    /// Menu of the chosen restaurant sent, waiting for an order.
    MenuSent,
    /// Order forwarded to the restaurant, waiting for its estimate.
    OrderPlaced,
    /// Estimate delivered.
    Done,
    /// Connection closed or dropped after a violation.
    Closed,
}

impl OrderState {
    /// Whether a restaurant estimate may be relayed to this session.
    pub fn awaits_estimate(self) -> bool {
        self == Self::OrderPlaced
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init => write!(f, "Init"),
            Self::OptionsSent => write!(f, "OptionsSent"),
            Self::MenuSent => write!(f, "MenuSent"),
            Self::OrderPlaced => write!(f, "OrderPlaced"),
            Self::Done => write!(f, "Done"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}
