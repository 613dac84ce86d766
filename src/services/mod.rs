pub mod checkout;
pub mod coupons;
pub mod housekeeping;
pub mod notifications;
pub mod payment_callback;
pub mod pricing;
pub mod refunds;
pub mod returns;
pub mod shipping;
