pub mod coupon;
pub mod notification_log;
pub mod order;
pub mod order_item;
pub mod price_list;
pub mod product;
pub mod product_price;
pub mod refund_event;
pub mod return_request;
pub mod webhook_event;
