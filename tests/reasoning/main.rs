mod consultation;
