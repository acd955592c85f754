fn main() {
    #[cfg(feature = "sqlite")]
    println!("cargo:rerun-if-changed=migrations/sqlite");
}
