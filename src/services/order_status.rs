use crate::entities::OrderStatus;
use crate::errors::ServiceError;

impl OrderStatus {
    /// Statuses reachable in one step from `self`
    pub fn allowed_transitions(self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Processing, OrderStatus::Canceled],
            OrderStatus::Processing => &[OrderStatus::Shipped, OrderStatus::Canceled],
            OrderStatus::Shipped => &[OrderStatus::Delivered, OrderStatus::Canceled],
            OrderStatus::Delivered | OrderStatus::Canceled => &[],
        }
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }
}

/// Rejects any status change missing from the transition table
pub fn ensure_transition(from: OrderStatus, to: OrderStatus) -> Result<(), ServiceError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(ServiceError::InvalidStatusTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
