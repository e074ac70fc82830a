pub mod fundamentals;
pub mod metadata;
pub mod price;
pub mod table;
