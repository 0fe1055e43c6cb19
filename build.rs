/// secp256k1-native build script.
///
/// Finds the pre-built secp256k1 library for the target platform and
/// generates `$OUT_DIR/embedded.rs`, the table behind
/// `resources::Embedded`.  Artifacts are looked up by file name in
/// `resources/` (or `$SECP256K1_NATIVE_RESOURCES`); a missing artifact is not
/// an error, it just leaves the table empty and the runtime loader reports
/// the backend as disabled.
use std::{env, fmt::Write as _, fs, path::PathBuf};

/// Namespace prefix of every embedded resource name.
const RESOURCE_NAMESPACE: &str = "coop/rchain";

fn main() {
    // Hard gate: the loader only knows how to open Unix shared objects and
    // Windows DLLs. Fail loudly on anything else rather than producing a
    // crate with no native loader at all.
    let family = env::var("CARGO_CFG_TARGET_FAMILY").unwrap_or_default();
    if !family.split(',').any(|f| f == "unix" || f == "windows") {
        panic!(
            "secp256k1-native only builds for unix or windows targets \
             (CARGO_CFG_TARGET_FAMILY = {family:?})"
        );
    }

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=SECP256K1_NATIVE_RESOURCES");

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_default());
    let resource_dir = env::var_os("SECP256K1_NATIVE_RESOURCES")
        .map(PathBuf::from)
        .unwrap_or_else(|| manifest_dir.join("resources"));
    // Only watch paths that exist: cargo treats a missing watched path as
    // always changed and would rerun this script on every build.
    if resource_dir.exists() {
        println!("cargo:rerun-if-changed={}", resource_dir.display());
    }

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();

    let mut table = String::from("pub(crate) static EMBEDDED: &[(&str, &[u8])] = &[\n");
    if let Some(file_name) = artifact_name(&target_os, &target_arch) {
        let artifact = resource_dir.join(&file_name);
        if artifact.is_file() {
            println!("cargo:rerun-if-changed={}", artifact.display());
            // `{:?}` renders a valid Rust string literal, escapes included.
            let _ = writeln!(
                table,
                "    ({:?}, include_bytes!({:?})),",
                format!("{RESOURCE_NAMESPACE}/{file_name}"),
                artifact.display().to_string(),
            );
        } else {
            println!(
                "cargo:warning=no embedded secp256k1 library: {} not found",
                artifact.display()
            );
        }
    }
    table.push_str("];\n");

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap_or_default());
    if let Err(e) = fs::write(out_dir.join("embedded.rs"), table) {
        panic!("failed to write embedded resource table: {e}");
    }
}

/// File name of the artifact for a cargo target, following
/// `secp256k1-native-<os>-<arch>.<ext>`.  Only targets the runtime loader
/// classifies as supported have one; Windows ARM64 does not.
fn artifact_name(target_os: &str, target_arch: &str) -> Option<String> {
    if target_os == "windows" && target_arch == "aarch64" {
        return None;
    }
    let (os, ext) = match target_os {
        "linux" => ("linux", "so"),
        "macos" => ("osx", "dylib"),
        "windows" => ("windows", "dll"),
        _ => return None,
    };
    let arch = match target_arch {
        "x86_64" => "x86_64",
        "aarch64" => "aarch64",
        _ => return None,
    };
    Some(format!("secp256k1-native-{os}-{arch}.{ext}"))
}
