pub mod bits;
pub mod work_divide;
