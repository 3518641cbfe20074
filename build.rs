fn main() {
    // Raw disk and volume handles need an elevated token on Windows.
    #[cfg(windows)]
    {
        use embed_manifest::manifest::ExecutionLevel;
        use embed_manifest::{embed_manifest, new_manifest};

        if std::env::var_os("CARGO_CFG_WINDOWS").is_some() {
            embed_manifest(
                new_manifest("Rawdev.Cli")
                    .requested_execution_level(ExecutionLevel::RequireAdministrator),
            )
            .expect("unable to embed manifest file");
        }
    }

    println!("cargo:rerun-if-changed=build.rs");
}
