pub(crate) mod booking_handlers;
pub(crate) mod payment_handlers;
pub(crate) mod upload;
