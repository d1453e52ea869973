pub mod address;
pub mod checkout_attempt;
pub mod coupon;
pub mod coupon_redemption;
pub mod message;
pub mod order;
pub mod order_item;
pub mod otp_code;
pub mod product;
pub mod rating;
pub mod store;
pub mod user;
pub mod wishlist_item;

pub use address::Entity as Address;
pub use checkout_attempt::Entity as CheckoutAttempt;
pub use coupon::Entity as Coupon;
pub use coupon_redemption::Entity as CouponRedemption;
pub use message::Entity as Message;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use otp_code::Entity as OtpCode;
pub use product::Entity as Product;
pub use rating::Entity as Rating;
pub use store::Entity as Store;
pub use user::Entity as User;
pub use wishlist_item::Entity as WishlistItem;
