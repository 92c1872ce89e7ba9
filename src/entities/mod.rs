pub mod discount;
pub mod download_token;
pub mod order;
pub mod order_item;
pub mod product;

pub use discount::Entity as Discount;
pub use download_token::Entity as DownloadToken;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use product::Entity as Product;
