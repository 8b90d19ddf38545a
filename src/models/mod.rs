pub mod user;
pub mod rbac;
pub mod inventory;
pub mod recipe;
pub mod product;
pub mod pos;
pub mod pricing;

pub use user::User;
pub use rbac::Role;
pub use inventory::{
    InventoryItem, InventoryCategory, InventoryBatch, InventoryTransaction,
    ItemInput, ReceiveBatch, BatchCount, StockCount,
};
pub use recipe::{Recipe, RecipeIngredient, RecipeWithIngredients, RecipeInput};
pub use product::{Product, MenuCategory, ProductUpdate, CategoryInput};
pub use pos::{
    PosTable, Ticket, TicketLine, TicketView, Order, PaymentMethod,
    TableInput, AddLine, SetQuantity, CheckoutRequest,
};
pub use pricing::{RefPrice, Supplier, RefPriceInput, SupplierInput};
