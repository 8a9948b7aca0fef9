pub mod nitter;
