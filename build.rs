fn main() {
    println!("cargo:rerun-if-changed=src/web/dashboard.html");

    // Host builds (tests, simulation) have no ESP-IDF toolchain to export.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
