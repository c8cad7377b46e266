fn main() {
  coinkeep::main();
}
