pub mod lipia;
