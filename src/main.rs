fn main() {
    kiln::cli::run();
}
