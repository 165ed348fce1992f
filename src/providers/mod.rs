pub mod oba;
