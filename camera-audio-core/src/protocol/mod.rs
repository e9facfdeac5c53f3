pub mod codec;
pub mod gatt;
