mod cart;
mod category;
mod donation;
mod license;
mod order;
mod product;
mod webhook_log;

pub use cart::*;
pub use category::*;
pub use donation::*;
pub use license::*;
pub use order::*;
pub use product::*;
pub use webhook_log::*;
