#[cfg(feature = "esp32")]
fn main() {
    embuild::espidf::sysenv::output();
}

#[cfg(not(feature = "esp32"))]
fn main() {}
