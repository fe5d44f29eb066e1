pub mod approval;
pub mod category;
pub mod ticket;
