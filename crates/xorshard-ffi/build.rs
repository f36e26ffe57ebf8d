use std::env;
use std::path::PathBuf;

fn main() {
    let crate_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let package_name = env::var("CARGO_PKG_NAME").unwrap();
    let output_file = target_dir().join(format!("{package_name}.h"));

    let bindings = cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_language(cbindgen::Language::C)
        .with_pragma_once(true)
        .with_documentation(true)
        .with_include_guard("XORSHARD_FFI_H")
        .with_sys_include("stddef.h")
        .generate();

    // Header generation is best-effort
    match bindings {
        Ok(bindings) => {
            bindings.write_to_file(&output_file);
            println!("cargo:warning=Generated C header: {}", output_file.display());
        }
        Err(e) => println!("cargo:warning=Skipping C header generation: {e}"),
    }

    println!("cargo:rerun-if-changed=src/");
}

fn target_dir() -> PathBuf {
    if let Ok(target) = env::var("CARGO_TARGET_DIR") {
        PathBuf::from(target).join("include")
    } else {
        PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap())
            .join("../../target")
            .join("include")
    }
}
