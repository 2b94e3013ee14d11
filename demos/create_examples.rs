use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    frontgen::apps::run_create_examples(std::env::args().skip(1))
}
