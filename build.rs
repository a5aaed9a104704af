fn main() {
    // ESP-IDF link arguments and environment; host builds need none.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
