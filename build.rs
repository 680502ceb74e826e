use std::env;
use std::fs::File;
use std::io::Write;
use std::path::Path;

//HAZPTR_RETIRE_THRESHOLD

fn main() {
    println!("cargo:rerun-if-env-changed=HAZPTR_RETIRE_THRESHOLD");

    let out_dir = env::var("OUT_DIR").expect("no out directory");
    let dest = Path::new(&out_dir).join("build_constants.rs");

    let mut file = File::create(&dest).expect("could not create file");

    let threshold: u32 = env::var("HAZPTR_RETIRE_THRESHOLD")
        .map_or(Ok(20), |var| var.parse())
        .expect("failed to parse env variable HAZPTR_RETIRE_THRESHOLD");

    if threshold == 0 {
        panic!("invalid HAZPTR_RETIRE_THRESHOLD value (0)");
    }

    write!(&mut file, "const RETIRE_THRESHOLD: u32 = {};", threshold)
        .expect("could not write to file");
}
