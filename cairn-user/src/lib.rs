pub mod config;
pub mod login;

// A caller is made of an identity (login)
// and of the token carried along every repository call.
