use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    frontgen::apps::run_find_examples(std::env::args().skip(1))
}
