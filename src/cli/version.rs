/// Display version information
pub fn execute() {
    println!("blockshred {}", env!("CARGO_PKG_VERSION"));
    println!("Secure block shredding for HDFS deletes");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_execute() {
        // Version command should not panic
        execute();
    }
}
