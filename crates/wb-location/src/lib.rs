//! wb-location
//!
//! GPS fix validation: origin (tracker id + HMAC signature) and physical
//! plausibility (great-circle jump from the previous fix).

mod validator;

pub use validator::{
    authenticate, haversine_km, sign_fix, signing_fields, LocationConfig, LocationRejection,
    LocationValidator, DEFAULT_MAX_JUMP_KM, EARTH_RADIUS_KM,
};
