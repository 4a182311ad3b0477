pub mod key_listener;
pub mod text_selection;
