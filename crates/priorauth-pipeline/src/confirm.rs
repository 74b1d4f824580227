/// Yes/no gate in front of a long-running batch.
pub trait Confirm {
    fn confirm(&self, question: &str) -> bool;
}

/// Always proceeds (`--yes`).
pub struct AutoConfirm;

impl Confirm for AutoConfirm {
    fn confirm(&self, _question: &str) -> bool {
        true
    }
}

/// Never proceeds.
pub struct Decline;

impl Confirm for Decline {
    fn confirm(&self, _question: &str) -> bool {
        false
    }
}
