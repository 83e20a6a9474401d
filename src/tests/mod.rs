mod work;

mod test_cancel_after;
