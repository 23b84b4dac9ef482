fn main() {
    atsrt_memcheck::memcheck_entry();
}
