#[cfg(test)]
mod tests {
    use crate::logger::setup_test_logger;

    #[small_ctor::ctor]
    unsafe fn init() {
        let _ = setup_test_logger();
    }
}
