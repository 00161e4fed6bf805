use std::env;
use std::path::PathBuf;

fn main() {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    // Host builds link normally so the unit tests run.
    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("none") {
        println!(
            "cargo:rustc-link-arg-bins=-T{}/linker.ld",
            manifest_dir.display()
        );
    }
    println!("cargo:rerun-if-changed=linker.ld");
}
