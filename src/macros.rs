pub use enclose::*;

/// Creates a [`Computation`](crate::Computation), cloning the listed
/// handles into its body.
///
/// ```ignore
/// let total = computation!((a, b) => a.get() + b.get())?;
/// ```
#[macro_export]
macro_rules! computation {
    (( $($d_tt:tt)* ) => $($b:tt)*) => {
        $crate::Computation::new($crate::macros::enclose!(($( $d_tt )*) move || { $($b)* }))
    };
    (=> $($b:tt)*) => {
        $crate::Computation::new(move || { $($b)* })
    };
}
