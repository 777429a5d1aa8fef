pub mod availability;
pub mod booking_service;
pub mod ipn_service;
pub mod reaper;
pub mod signature;
pub mod vnpay_service;
