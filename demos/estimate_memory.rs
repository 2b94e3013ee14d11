use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    frontgen::apps::run_estimate_memory(std::env::args().skip(1))
}
